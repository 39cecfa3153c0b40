use super::{LiveUsage, session::aggregate_session_file};
use chrono::{DateTime, Local, NaiveDate};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::SystemTime,
};
use thiserror::Error;

const SESSION_LOG_EXTENSION: &str = "jsonl";

/// Shared flag a caller trips to stop an in-flight scan.
#[derive(Clone, Debug, Default)]
pub struct ScanCancel {
    cancelled: Arc<AtomicBool>,
}

impl ScanCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Cancels the scan once the returned guard is dropped.
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

pub struct CancelOnDrop(ScanCancel);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[derive(Debug, Error)]
#[error("live usage scan was cancelled")]
pub struct ScanCancelled;

/// Sums usage from every session log under `projects_dir` last modified on
/// `today` (local calendar date).
///
/// Only the immediate project subdirectories are searched. Unreadable
/// directories and files are logged and skipped; a missing root is an empty
/// result.
pub fn scan_today(
    projects_dir: &Path,
    today: NaiveDate,
    cancel: &ScanCancel,
) -> Result<LiveUsage, ScanCancelled> {
    let mut usage = LiveUsage::default();

    if !projects_dir.exists() {
        tracing::debug!(root = %projects_dir.display(), "projects directory not found");
        return Ok(usage);
    }

    let projects = match fs::read_dir(projects_dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(error = %err, root = %projects_dir.display(), "failed to read projects directory");
            return Ok(usage);
        }
    };

    for entry in projects {
        if cancel.is_cancelled() {
            return Err(ScanCancelled);
        }
        let project = match entry {
            Ok(entry) => entry.path(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read project entry");
                continue;
            }
        };
        if !project.is_dir() {
            continue;
        }

        for path in session_logs(&project) {
            if cancel.is_cancelled() {
                return Err(ScanCancelled);
            }
            if !modified_on(&path, today) {
                continue;
            }
            let fold = aggregate_session_file(&path);
            usage.add_session(&fold);
        }
    }

    tracing::debug!(
        files = usage.files_scanned,
        failed = usage.files_failed,
        messages = usage.message_count,
        "live usage scan finished"
    );
    Ok(usage)
}

fn session_logs(project: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(project) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(error = %err, path = %project.display(), "failed to read project directory");
            return Vec::new();
        }
    };

    let mut logs = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, path = %project.display(), "failed to read directory entry");
                continue;
            }
        };
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some(SESSION_LOG_EXTENSION)
            && path.is_file()
        {
            logs.push(path);
        }
    }
    logs
}

fn modified_on(path: &Path, today: NaiveDate) -> bool {
    match path.metadata().and_then(|meta| meta.modified()) {
        Ok(modified) => local_date(modified) == today,
        Err(err) => {
            tracing::warn!(error = %err, path = %path.display(), "failed to stat session file");
            false
        }
    }
}

pub(crate) fn local_date(time: SystemTime) -> NaiveDate {
    DateTime::<Local>::from(time).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs::File, time::Duration};
    use tempfile::TempDir;

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    fn usage_line(id: &str, input: u64, output: u64) -> String {
        format!(
            r#"{{"type":"assistant","requestId":"{id}","message":{{"usage":{{"input_tokens":{input},"output_tokens":{output},"cache_read_input_tokens":1}}}}}}"#
        )
    }

    fn write_log(dir: &Path, project: &str, name: &str, lines: &[String]) -> PathBuf {
        let project_dir = dir.join(project);
        fs::create_dir_all(&project_dir).unwrap();
        let path = project_dir.join(name);
        let mut body = lines.join("\n");
        body.push('\n');
        fs::write(&path, body).unwrap();
        path
    }

    fn age(path: &Path, by: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let usage = scan_today(&dir.path().join("projects"), today(), &ScanCancel::new()).unwrap();
        assert_eq!(usage, LiveUsage::default());
    }

    #[test]
    fn empty_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let usage = scan_today(dir.path(), today(), &ScanCancel::new()).unwrap();
        assert_eq!(usage, LiveUsage::default());
        assert_eq!(usage.message_count, 0);
    }

    #[test]
    fn sums_todays_logs_across_projects() {
        let dir = TempDir::new().unwrap();
        write_log(
            dir.path(),
            "-home-dev-alpha",
            "s1.jsonl",
            &[usage_line("a", 100, 50), usage_line("a", 100, 50)],
        );
        write_log(
            dir.path(),
            "-home-dev-beta",
            "s2.jsonl",
            &[usage_line("a", 10, 5), usage_line("b", 1, 1)],
        );

        let usage = scan_today(dir.path(), today(), &ScanCancel::new()).unwrap();
        assert_eq!(usage.input_tokens, 111);
        assert_eq!(usage.output_tokens, 56);
        assert_eq!(usage.cache_read_tokens, 3);
        assert_eq!(usage.message_count, 3);
        assert_eq!(usage.files_scanned, 2);
        assert_eq!(usage.files_failed, 0);
    }

    #[test]
    fn older_logs_contribute_nothing() {
        let dir = TempDir::new().unwrap();
        let stale = write_log(dir.path(), "p", "old.jsonl", &[usage_line("x", 500, 500)]);
        age(&stale, Duration::from_secs(2 * 24 * 60 * 60));
        write_log(dir.path(), "p", "new.jsonl", &[usage_line("y", 1, 2)]);

        let usage = scan_today(dir.path(), today(), &ScanCancel::new()).unwrap();
        assert_eq!(usage.input_tokens, 1);
        assert_eq!(usage.output_tokens, 2);
        assert_eq!(usage.files_scanned, 1);
    }

    #[test]
    fn skips_other_extensions_loose_files_and_nested_dirs() {
        let dir = TempDir::new().unwrap();
        write_log(dir.path(), "p", "notes.txt", &[usage_line("n", 9, 9)]);
        write_log(dir.path(), "p/nested", "deep.jsonl", &[usage_line("d", 9, 9)]);
        fs::write(dir.path().join("stray.jsonl"), usage_line("s", 9, 9)).unwrap();
        write_log(dir.path(), "p", "real.jsonl", &[usage_line("r", 4, 4)]);

        let usage = scan_today(dir.path(), today(), &ScanCancel::new()).unwrap();
        assert_eq!(usage.input_tokens, 4);
        assert_eq!(usage.message_count, 1);
    }

    #[test]
    fn unlistable_project_is_skipped() {
        let dir = TempDir::new().unwrap();
        let loose = dir.path().join("not-a-dir.jsonl");
        fs::write(&loose, usage_line("z", 1, 1)).unwrap();
        assert!(session_logs(&loose).is_empty());
        assert!(session_logs(&dir.path().join("gone")).is_empty());
    }

    #[test]
    fn unstattable_log_is_not_from_today() {
        let dir = TempDir::new().unwrap();
        assert!(!modified_on(&dir.path().join("vanished.jsonl"), today()));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_project_does_not_abort_siblings() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        write_log(dir.path(), "-home-dev-locked", "s.jsonl", &[usage_line("l", 900, 900)]);
        write_log(dir.path(), "-home-dev-open", "s.jsonl", &[usage_line("o", 6, 3)]);
        let locked = dir.path().join("-home-dev-locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not bind root.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let usage = scan_today(dir.path(), today(), &ScanCancel::new()).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(usage.input_tokens, 6);
        assert_eq!(usage.output_tokens, 3);
        assert_eq!(usage.files_scanned, 1);
    }

    #[test]
    fn cancelled_scan_stops() {
        let dir = TempDir::new().unwrap();
        write_log(dir.path(), "p", "s.jsonl", &[usage_line("a", 1, 1)]);
        let cancel = ScanCancel::new();
        cancel.cancel();
        assert!(scan_today(dir.path(), today(), &cancel).is_err());
    }

    #[test]
    fn drop_guard_trips_cancel() {
        let cancel = ScanCancel::new();
        {
            let _guard = cancel.drop_guard();
            assert!(!cancel.is_cancelled());
        }
        assert!(cancel.is_cancelled());
    }
}
