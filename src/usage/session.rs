use super::{SessionUsageTotal, dedup::RequestDeduplicator, record::parse_line};
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

/// A session log on disk, readable any number of times as a lazy line sequence.
#[derive(Clone, Debug)]
pub struct SessionLog {
    path: PathBuf,
}

impl SessionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the file afresh and streams it line by line.
    pub fn lines(&self) -> io::Result<LogLines<BufReader<File>>> {
        let file = File::open(&self.path)?;
        Ok(LogLines::new(BufReader::new(file)))
    }
}

/// Line iterator that tolerates invalid UTF-8, so a corrupt line reaches the
/// parser (and gets skipped there) instead of ending the file early.
pub struct LogLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LogLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for LogLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                let text = String::from_utf8_lossy(&self.buf);
                Some(Ok(text.trim_end_matches(['\n', '\r']).to_string()))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Result of folding one session file.
#[derive(Debug)]
pub struct SessionFold {
    pub totals: SessionUsageTotal,
    error: Option<io::Error>,
}

impl SessionFold {
    pub fn complete(totals: SessionUsageTotal) -> Self {
        Self {
            totals,
            error: None,
        }
    }

    pub fn interrupted(totals: SessionUsageTotal, error: io::Error) -> Self {
        Self {
            totals,
            error: Some(error),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }
}

/// Folds a line sequence into one usage total, counting each request id once.
///
/// Stops at the first read error and hands back whatever was accumulated.
pub fn fold_lines<I>(lines: I) -> SessionFold
where
    I: IntoIterator<Item = io::Result<String>>,
{
    let mut totals = SessionUsageTotal::default();
    let mut dedup = RequestDeduplicator::new();

    for line in lines {
        let line = match line {
            Ok(line) => line,
            Err(err) => return SessionFold::interrupted(totals, err),
        };
        let Some(event) = parse_line(&line) else {
            continue;
        };
        if dedup.first_sighting(event.request_id.as_deref()) {
            totals.record(&event);
        }
    }

    SessionFold::complete(totals)
}

/// Folds one session file from disk. Read failures are logged and the partial
/// total is returned.
pub fn aggregate_session_file(path: &Path) -> SessionFold {
    let log = SessionLog::new(path);
    let fold = match log.lines() {
        Ok(lines) => fold_lines(lines),
        Err(err) => SessionFold::interrupted(SessionUsageTotal::default(), err),
    };

    if let Some(err) = fold.error() {
        tracing::warn!(
            error = %err,
            path = %log.path().display(),
            messages = fold.totals.message_count,
            "session log read stopped early, keeping partial totals"
        );
    }

    fold
}
