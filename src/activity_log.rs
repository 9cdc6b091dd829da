//! Append-only activity log with daily and size-based rotation.
//!
//! Files live in one directory and are named
//! `user_attempts_YYYY-MM-DD_HH-MM-SS-mmm.log`. A new file is started on the
//! first write of each UTC day and whenever the current one would grow past
//! the size limit. Entries look like `[2024-05-01T10:00:00.000Z] TYPE: text`.
//!
//! Write failures are logged and swallowed; the log must never fail a
//! request.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub const LOG_FILE_PREFIX: &str = "user_attempts_";
pub const LOG_FILE_SUFFIX: &str = ".log";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;
pub const DEFAULT_DAYS_TO_KEEP: u32 = 30;

/// Length of `%Y-%m-%d_%H-%M-%S-%3f`.
const STAMP_LEN: usize = 23;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    UserAction,
    Error,
    ModelResponse,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::UserAction => "USER_ACTION",
            EntryKind::Error => "ERROR",
            EntryKind::ModelResponse => "OPENAI_RESPONSE",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogInfo {
    pub log_directory: String,
    pub log_file: Option<String>,
    pub max_file_size: String,
    pub current_date: String,
}

pub struct ActivityLog {
    dir: PathBuf,
    max_file_size: u64,
    /// File currently being appended to.
    current: Mutex<Option<PathBuf>>,
}

impl ActivityLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            current: Mutex::new(None),
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub async fn record(&self, kind: EntryKind, content: &str) {
        let now = Utc::now();
        let entry = format_entry(now, kind, content);
        tracing::debug!("{} entry recorded ({} bytes)", kind.as_str(), entry.len());

        if let Err(e) = self.append(now, &entry).await {
            tracing::warn!(
                "Failed to write activity log in {}: {}",
                self.dir.display(),
                e
            );
        }
    }

    pub async fn user_action(&self, action: &str, details: &Value) {
        let details = serde_json::to_string_pretty(details).unwrap_or_else(|_| details.to_string());
        self.record(
            EntryKind::UserAction,
            &format!("Action: {action}\nDetails: {details}"),
        )
        .await;
    }

    pub async fn error(&self, context: &str, error: &(dyn std::fmt::Display + Sync)) {
        self.record(
            EntryKind::Error,
            &format!("Context: {context}\nError: {error}"),
        )
        .await;
    }

    async fn append(&self, now: DateTime<Utc>, entry: &str) -> io::Result<()> {
        let mut current = self.current.lock().await;
        fs::create_dir_all(&self.dir).await?;

        let path = self.target_file(now, current.as_deref(), entry.len() as u64).await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await?;

        *current = Some(path);
        Ok(())
    }

    /// The file the next entry goes to: the current one if it is from today
    /// and has room, else today's newest file if it has room, else a new one.
    async fn target_file(
        &self,
        now: DateTime<Utc>,
        current: Option<&Path>,
        incoming: u64,
    ) -> io::Result<PathBuf> {
        let today = format!("{LOG_FILE_PREFIX}{}_", now.format("%Y-%m-%d"));

        let candidate = match current {
            Some(path) if file_name_starts_with(path, &today) => Some(path.to_path_buf()),
            _ => self
                .list_log_files()
                .await?
                .into_iter()
                .find(|name| name.starts_with(&today))
                .map(|name| self.dir.join(name)),
        };

        if let Some(path) = candidate {
            match fs::metadata(&path).await {
                Ok(meta) if meta.len() + incoming <= self.max_file_size => return Ok(path),
                Ok(_) => tracing::debug!("Rotating activity log {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        self.fresh_file(now).await
    }

    async fn fresh_file(&self, now: DateTime<Utc>) -> io::Result<PathBuf> {
        let base = now.format("%Y-%m-%d_%H-%M-%S-%3f").to_string();
        let mut path = self.dir.join(format!("{LOG_FILE_PREFIX}{base}{LOG_FILE_SUFFIX}"));
        let mut n = 1;
        while fs::try_exists(&path).await? {
            path = self
                .dir
                .join(format!("{LOG_FILE_PREFIX}{base}-{n}{LOG_FILE_SUFFIX}"));
            n += 1;
        }
        Ok(path)
    }

    async fn list_log_files(&self) -> io::Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if is_log_file_name(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort_unstable_by(|a, b| file_order_key(b).cmp(&file_order_key(a)));
        Ok(names)
    }

    /// Log file names, newest first. Empty when the directory is unreadable.
    pub async fn log_files(&self) -> Vec<String> {
        self.list_log_files().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to list activity logs: {}", e);
            Vec::new()
        })
    }

    /// Delete log files last modified more than `days_to_keep` days ago.
    /// Returns the number of files removed.
    pub async fn cleanup_old_logs(&self, days_to_keep: u32) -> io::Result<usize> {
        let age = Duration::from_secs(u64::from(days_to_keep) * SECONDS_PER_DAY);
        let cutoff = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.remove_modified_before(cutoff).await
    }

    async fn remove_modified_before(&self, cutoff: SystemTime) -> io::Result<usize> {
        let _guard = self.current.lock().await;
        let mut removed = 0;

        for name in self.list_log_files().await? {
            let path = self.dir.join(&name);
            let modified = fs::metadata(&path).await?.modified()?;
            if modified < cutoff {
                fs::remove_file(&path).await?;
                tracing::info!("Deleted old log file: {}", name);
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("Cleaned up {} old log files", removed);
        }
        Ok(removed)
    }

    pub async fn info(&self) -> LogInfo {
        let current = self.current.lock().await.clone();
        let log_file = match current {
            Some(path) => Some(path),
            None => self.log_files().await.into_iter().next().map(|n| self.dir.join(n)),
        };

        LogInfo {
            log_directory: self.dir.display().to_string(),
            log_file: log_file.map(|p| p.display().to_string()),
            max_file_size: format!("{}MB", self.max_file_size / (1024 * 1024)),
            current_date: Utc::now().format("%Y-%m-%d").to_string(),
        }
    }
}

pub fn format_entry(now: DateTime<Utc>, kind: EntryKind, content: &str) -> String {
    format!(
        "[{}] {}: {}\n",
        now.to_rfc3339_opts(SecondsFormat::Millis, true),
        kind.as_str(),
        content
    )
}

/// Date part (`YYYY-MM-DD`) of a log file name.
pub fn file_date(name: &str) -> Option<&str> {
    let date = name.strip_prefix(LOG_FILE_PREFIX)?.get(..10)?;
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(date)
}

/// Timestamp and collision counter of a log file name. A plain name sorts
/// before its `-1`, `-2` siblings.
fn file_order_key(name: &str) -> (&str, u32) {
    let stem = name
        .strip_prefix(LOG_FILE_PREFIX)
        .and_then(|n| n.strip_suffix(LOG_FILE_SUFFIX))
        .unwrap_or(name);

    match (stem.get(..STAMP_LEN), stem.get(STAMP_LEN..)) {
        (Some(stamp), Some(rest)) => {
            let counter = rest
                .strip_prefix('-')
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            (stamp, counter)
        }
        _ => (stem, 0),
    }
}

fn is_log_file_name(name: &str) -> bool {
    name.starts_with(LOG_FILE_PREFIX) && name.ends_with(LOG_FILE_SUFFIX)
}

fn file_name_starts_with(path: &Path, prefix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entry_format() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(
            format_entry(now, EntryKind::ModelResponse, "{}"),
            "[2024-05-01T10:00:00.000Z] OPENAI_RESPONSE: {}\n"
        );
    }

    #[test]
    fn test_file_date() {
        assert_eq!(
            file_date("user_attempts_2024-05-01_10-00-00-000.log"),
            Some("2024-05-01")
        );
        assert_eq!(file_date("analytics.json"), None);
        assert_eq!(file_date("user_attempts_garbage.log"), None);
    }

    #[test]
    fn test_error_entry_future_is_send() {
        fn assert_send<T: Send>(_: T) {}
        let log = ActivityLog::new("unused");
        let err = io::Error::other("boom");
        assert_send(log.error("context", &err));
    }

    #[tokio::test]
    async fn test_newest_collision_file_is_reused_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let base = Utc::now().format("%Y-%m-%d_%H-%M-%S-%3f").to_string();
        let plain = format!("{LOG_FILE_PREFIX}{base}{LOG_FILE_SUFFIX}");
        let second = format!("{LOG_FILE_PREFIX}{base}-1{LOG_FILE_SUFFIX}");
        std::fs::write(dir.path().join(&plain), "").unwrap();
        std::fs::write(dir.path().join(&second), "").unwrap();

        let log = ActivityLog::new(dir.path());
        assert_eq!(log.log_files().await, vec![second.clone(), plain.clone()]);

        log.record(EntryKind::UserAction, "after restart").await;
        let text = std::fs::read_to_string(dir.path().join(&second)).unwrap();
        assert!(text.contains("after restart"));
    }

    #[tokio::test]
    async fn test_entries_append_to_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path());

        log.record(EntryKind::UserAction, "first").await;
        log.user_action("generate", &serde_json::json!({"goal": "x"})).await;

        let files = log.log_files().await;
        assert_eq!(files.len(), 1);
        assert!(file_date(&files[0]).is_some());

        let text = std::fs::read_to_string(dir.path().join(&files[0])).unwrap();
        assert!(text.contains("] USER_ACTION: first\n"));
        assert!(text.contains("Action: generate\nDetails: {"));
    }

    #[tokio::test]
    async fn test_rotates_when_size_limit_is_reached() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path()).with_max_file_size(80);

        for i in 0..3 {
            log.record(EntryKind::Error, &format!("failure number {i}")).await;
        }

        let files = log.log_files().await;
        assert_eq!(files.len(), 3);
        for name in &files {
            let text = std::fs::read_to_string(dir.path().join(name)).unwrap();
            assert_eq!(text.lines().count(), 1);
        }
    }

    #[tokio::test]
    async fn test_cleanup_only_touches_old_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path());
        log.record(EntryKind::UserAction, "entry").await;
        std::fs::write(dir.path().join("analytics.json"), "{}").unwrap();

        assert_eq!(log.cleanup_old_logs(DEFAULT_DAYS_TO_KEEP).await.unwrap(), 0);
        assert_eq!(log.log_files().await.len(), 1);

        let future = SystemTime::now() + Duration::from_secs(3600);
        assert_eq!(log.remove_modified_before(future).await.unwrap(), 1);
        assert!(log.log_files().await.is_empty());
        assert!(dir.path().join("analytics.json").exists());
    }

    #[tokio::test]
    async fn test_missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path().join("absent"));
        assert!(log.log_files().await.is_empty());

        let info = log.info().await;
        assert_eq!(info.max_file_size, "20MB");
        assert!(info.log_file.is_none());
    }
}
