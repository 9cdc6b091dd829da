use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::analytics::DownloadType;
use crate::plan::Breakdown;

pub const TEXT_HEADER: &str = "Task Breakdown";

pub trait Exporter {
    fn content_type(&self) -> &'static str;
    fn file_extension(&self) -> &'static str;
    fn render(&self, breakdown: &Breakdown) -> Result<Vec<u8>>;
}

// Plain text, the format of the "download as text" button
pub struct TextExporter;

impl Exporter for TextExporter {
    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "txt"
    }

    fn render(&self, breakdown: &Breakdown) -> Result<Vec<u8>> {
        Ok(render_text(breakdown).into_bytes())
    }
}

// Pretty-printed wire format
pub struct JsonExporter;

impl Exporter for JsonExporter {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn file_extension(&self) -> &'static str {
        "json"
    }

    fn render(&self, breakdown: &Breakdown) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(breakdown)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Text,
    Json,
    Pdf,
}

impl ExportFormat {
    /// `None` for formats rendered elsewhere (PDF is produced client side).
    pub fn exporter(self) -> Option<Box<dyn Exporter + Send>> {
        match self {
            ExportFormat::Text => Some(Box::new(TextExporter)),
            ExportFormat::Json => Some(Box::new(JsonExporter)),
            ExportFormat::Pdf => None,
        }
    }

    pub fn download_type(self) -> DownloadType {
        match self {
            ExportFormat::Text => DownloadType::Text,
            ExportFormat::Json => DownloadType::Json,
            ExportFormat::Pdf => DownloadType::Pdf,
        }
    }
}

/// Header, then each unit label followed by `  - task` lines and a blank line.
pub fn render_text(breakdown: &Breakdown) -> String {
    let mut s = String::new();
    s.push_str(TEXT_HEADER);
    s.push_str("\n\n");

    for unit in &breakdown.units {
        s.push_str(&unit.label);
        s.push('\n');
        for task in &unit.subtasks {
            s.push_str("  - ");
            s.push_str(task);
            s.push('\n');
        }
        s.push('\n');
    }

    s
}
