use crate::config::EnginePaths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Precomputed statistics that Claude Code keeps in `stats-cache.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    #[serde(default)]
    pub daily_activity: Vec<DailyActivity>,
    #[serde(default)]
    pub daily_model_tokens: Vec<DailyModelTokens>,
    #[serde(default)]
    pub model_usage: BTreeMap<String, ModelUsage>,
    #[serde(default)]
    pub total_sessions: u64,
    #[serde(default)]
    pub total_messages: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_computed_date: Option<String>,
    /// Fields this service does not interpret, kept for the raw view.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivity {
    pub date: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub session_count: u64,
    #[serde(default)]
    pub tool_call_count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyModelTokens {
    pub date: String,
    #[serde(default)]
    pub tokens_by_model: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ModelUsage {
    /// Cache write tokens under either key; `cacheWriteInputTokens` wins when
    /// both are present.
    pub fn cache_write_tokens(&self) -> u64 {
        self.cache_write_input_tokens
            .or(self.cache_creation_input_tokens)
            .unwrap_or(0)
    }
}

impl StatsSnapshot {
    pub fn activity_on(&self, date: &str) -> Option<&DailyActivity> {
        self.daily_activity.iter().find(|activity| activity.date == date)
    }
}

/// Metadata about the snapshot file, used to explain staleness.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFileInfo {
    pub exists: bool,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_computed_date: Option<String>,
}

/// Read-only access to the stats snapshot at a fixed path.
#[derive(Clone, Debug)]
pub struct SnapshotReader {
    path: PathBuf,
}

impl SnapshotReader {
    pub fn new(paths: &EnginePaths) -> Self {
        Self::at(paths.stats_file.clone())
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Loads the snapshot. A missing, unreadable or undecodable file is
    /// reported as `None`.
    pub fn read(&self) -> Option<StatsSnapshot> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::debug!(error = %err, path = %self.path.display(), "stats snapshot not readable");
                return None;
            }
        };
        match serde_json::from_str::<StatsSnapshot>(&contents) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(error = %err, path = %self.path.display(), "failed to decode stats snapshot");
                None
            }
        }
    }

    pub fn file_info(&self) -> SnapshotFileInfo {
        let metadata = match fs::metadata(&self.path) {
            Ok(meta) if meta.is_file() => meta,
            _ => {
                return SnapshotFileInfo {
                    exists: false,
                    path: self.path.clone(),
                    size: None,
                    last_modified: None,
                    last_computed_date: None,
                };
            }
        };

        SnapshotFileInfo {
            exists: true,
            path: self.path.clone(),
            size: Some(metadata.len()),
            last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            last_computed_date: self.read().and_then(|snapshot| snapshot.last_computed_date),
        }
    }

    /// The newest `days` activity entries, oldest first.
    pub fn daily_activity(&self, days: usize) -> Vec<DailyActivity> {
        self.read()
            .map(|snapshot| newest_first_window(snapshot.daily_activity, days, |a| &a.date))
            .unwrap_or_default()
    }

    /// The newest `days` per-model token entries, oldest first.
    pub fn daily_model_tokens(&self, days: usize) -> Vec<DailyModelTokens> {
        self.read()
            .map(|snapshot| newest_first_window(snapshot.daily_model_tokens, days, |t| &t.date))
            .unwrap_or_default()
    }
}

// ISO dates order lexicographically.
fn newest_first_window<T, F>(mut entries: Vec<T>, days: usize, date: F) -> Vec<T>
where
    F: Fn(&T) -> &String,
{
    entries.sort_by(|a, b| date(b).cmp(date(a)));
    entries.truncate(days);
    entries.reverse();
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "version": 2,
        "lastComputedDate": "2026-10-16",
        "dailyActivity": [
            {"date": "2026-10-14", "messageCount": 3, "sessionCount": 1, "toolCallCount": 2},
            {"date": "2026-10-16", "messageCount": 9, "sessionCount": 2, "toolCallCount": 4},
            {"date": "2026-10-15", "messageCount": 5, "sessionCount": 1, "toolCallCount": 0}
        ],
        "dailyModelTokens": [
            {"date": "2026-10-15", "tokensByModel": {"claude-opus-4": 120}},
            {"date": "2026-10-16", "tokensByModel": {"claude-sonnet-4": 80}}
        ],
        "modelUsage": {
            "claude-sonnet-4": {"inputTokens": 10, "outputTokens": 5, "cacheReadInputTokens": 2, "cacheCreationInputTokens": 7, "costUSD": 0}
        },
        "totalSessions": 4,
        "totalMessages": 17,
        "hourCounts": {"9": 3}
    }"#;

    fn reader_with(contents: Option<&str>) -> (TempDir, SnapshotReader) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats-cache.json");
        if let Some(contents) = contents {
            fs::write(&path, contents).unwrap();
        }
        (dir, SnapshotReader::at(path))
    }

    #[test]
    fn reads_snapshot_and_keeps_unknown_fields() {
        let (_dir, reader) = reader_with(Some(SAMPLE));
        assert!(reader.exists());
        let snapshot = reader.read().unwrap();
        assert_eq!(snapshot.total_sessions, 4);
        assert_eq!(snapshot.total_messages, 17);
        assert_eq!(snapshot.last_computed_date.as_deref(), Some("2026-10-16"));
        let model = &snapshot.model_usage["claude-sonnet-4"];
        assert_eq!(model.cache_creation_input_tokens, Some(7));
        assert_eq!(model.cache_write_tokens(), 7);
        assert!(snapshot.extra.contains_key("hourCounts"));
        assert_eq!(snapshot.activity_on("2026-10-15").unwrap().message_count, 5);
        assert!(snapshot.activity_on("2026-10-17").is_none());

        let raw = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(raw["version"], 2);
        assert_eq!(raw["modelUsage"]["claude-sonnet-4"]["costUSD"], 0);
    }

    #[test]
    fn both_cache_write_keys_are_accepted() {
        let (_dir, reader) = reader_with(Some(
            r#"{"modelUsage":{"m1":{"inputTokens":1,"outputTokens":1,"cacheWriteInputTokens":3,"cacheCreationInputTokens":5}},"totalSessions":1}"#,
        ));
        let snapshot = reader.read().unwrap();
        let model = &snapshot.model_usage["m1"];
        assert_eq!(model.cache_write_input_tokens, Some(3));
        assert_eq!(model.cache_creation_input_tokens, Some(5));
        assert_eq!(model.cache_write_tokens(), 3);

        let raw = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(raw["modelUsage"]["m1"]["cacheWriteInputTokens"], 3);
        assert_eq!(raw["modelUsage"]["m1"]["cacheCreationInputTokens"], 5);
    }

    #[test]
    fn missing_file_is_absent_not_an_error() {
        let (_dir, reader) = reader_with(None);
        assert!(!reader.exists());
        assert!(reader.read().is_none());
        let info = reader.file_info();
        assert!(!info.exists);
        assert_eq!(info.path, reader.path());
        assert!(info.size.is_none());
        assert!(info.last_modified.is_none());
        assert!(reader.daily_activity(7).is_empty());
    }

    #[test]
    fn corrupt_file_degrades_to_absent() {
        let (_dir, reader) = reader_with(Some("{\"totalSessions\": 4,"));
        assert!(reader.exists());
        assert!(reader.read().is_none());
        let info = reader.file_info();
        assert!(info.exists);
        assert!(info.size.is_some());
        assert!(info.last_computed_date.is_none());
    }

    #[test]
    fn file_info_reports_metadata() {
        let (_dir, reader) = reader_with(Some(SAMPLE));
        let info = reader.file_info();
        assert!(info.exists);
        assert_eq!(info.size, Some(SAMPLE.len() as u64));
        assert!(info.last_modified.is_some());
        assert_eq!(info.last_computed_date.as_deref(), Some("2026-10-16"));
    }

    #[test]
    fn daily_windows_are_newest_days_oldest_first() {
        let (_dir, reader) = reader_with(Some(SAMPLE));
        let dates: Vec<String> = reader
            .daily_activity(2)
            .into_iter()
            .map(|a| a.date)
            .collect();
        assert_eq!(dates, vec!["2026-10-15", "2026-10-16"]);
        assert_eq!(reader.daily_activity(30).len(), 3);
        assert_eq!(reader.daily_activity(30)[0].date, "2026-10-14");

        let tokens = reader.daily_model_tokens(1);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].tokens_by_model["claude-sonnet-4"], 80);
    }
}
