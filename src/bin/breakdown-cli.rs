use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, Read, Write};
use task_breakdown::client::BreakdownClient;
use task_breakdown::export::ExportFormat;
use task_breakdown::plan::{BreakdownForm, EffortUnit, Granularity};

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "breakdown-cli")]
#[command(about = "CLI client for the task breakdown server")]
struct Cli {
    /// Goal to break down (use "-" to read it from stdin)
    #[arg(short, long)]
    goal: String,

    /// Total effort, counted in --unit
    #[arg(short, long)]
    effort: u32,

    /// Effort unit: hours, days or months
    #[arg(short, long, default_value = "days")]
    unit: String,

    /// Hours per day committed to the goal
    #[arg(short, long, default_value = "2")]
    daily_hours: u32,

    /// Plan granularity: daily or weekly
    #[arg(long, default_value = "weekly")]
    granularity: String,

    /// Server address (e.g., "http://localhost:3000")
    #[arg(short, long, default_value = "http://localhost:3000")]
    server: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Also ask the server for a one-sentence summary
    #[arg(long)]
    summary: bool,

    /// Request timeout in seconds
    #[arg(short, long, default_value = "300")]
    timeout: u64,
}

fn parse_unit(s: &str) -> Result<EffortUnit> {
    match s.to_lowercase().as_str() {
        "hours" | "hour" | "h" => Ok(EffortUnit::Hours),
        "days" | "day" | "d" => Ok(EffortUnit::Days),
        "months" | "month" | "m" => Ok(EffortUnit::Months),
        other => Err(anyhow!("Unknown effort unit: {other}")),
    }
}

fn parse_granularity(s: &str) -> Result<Granularity> {
    match s.to_lowercase().as_str() {
        "daily" | "day" => Ok(Granularity::Daily),
        "weekly" | "week" => Ok(Granularity::Weekly),
        other => Err(anyhow!("Unknown granularity: {other}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let goal = if cli.goal == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| anyhow!("Failed to read from stdin: {e}"))?;
        buffer.trim().to_string()
    } else {
        cli.goal.clone()
    };

    let form = BreakdownForm {
        goal,
        total_effort: cli.effort,
        effort_unit: parse_unit(&cli.unit)?,
        daily_hours_commitment: cli.daily_hours,
        granularity: parse_granularity(&cli.granularity)?,
    };

    let client = BreakdownClient::new(cli.server.clone());
    eprintln!("Requesting breakdown from {}...", cli.server);

    let timeout = std::time::Duration::from_secs(cli.timeout);
    let response = client
        .generate_with_timeout(&form, timeout)
        .await
        .map_err(|e| anyhow!("Breakdown failed: {e}"))?;

    let meta = &response.meta;
    eprintln!(
        "{:?}: {} of {} units generated by the model ({:?})",
        meta.status,
        meta.expected_units - meta.fallback_units.min(meta.expected_units),
        meta.expected_units,
        meta.mode
    );

    let export = match cli.format {
        OutputFormat::Text => ExportFormat::Text,
        OutputFormat::Json => ExportFormat::Json,
    };
    let rendered = client
        .export(export, &response.breakdown)
        .await
        .map_err(|e| anyhow!("Export failed: {e}"))?;
    io::stdout()
        .write_all(&rendered)
        .map_err(|e| anyhow!("Failed to write output: {e}"))?;

    if cli.summary {
        let summary = client
            .summarize(&response.breakdown)
            .await
            .map_err(|e| anyhow!("Summary failed: {e}"))?;
        println!("{}", summary.summary);
    }

    Ok(())
}
