//! Live usage aggregation over Claude Code session logs.
//!
//! Each `<projects>/<project>/*.jsonl` file is an append-only log of session
//! events. Assistant turns carry a `message.usage` object; streamed responses
//! repeat the same `requestId` several times, so counting happens per file
//! behind a [`dedup::RequestDeduplicator`].

pub mod dedup;
pub mod live;
pub mod record;
pub mod session;

use serde::Serialize;

pub use live::{ScanCancel, ScanCancelled, scan_today};
pub use session::SessionFold;

/// One assistant turn's token usage, as read from a single log line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageEvent {
    pub request_id: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

/// Usage accumulated from one session file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUsageTotal {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub message_count: u64,
}

impl SessionUsageTotal {
    pub fn record(&mut self, event: &UsageEvent) {
        self.input_tokens = self.input_tokens.saturating_add(event.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(event.output_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(event.cache_creation_tokens);
        self.cache_read_tokens = self
            .cache_read_tokens
            .saturating_add(event.cache_read_tokens);
        self.message_count = self.message_count.saturating_add(1);
    }
}

/// Today's usage summed across every session file modified today.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub message_count: u64,
    /// Session files folded during the scan.
    pub files_scanned: u64,
    /// Files whose fold stopped early on an I/O error; their partial totals
    /// are still included above.
    pub files_failed: u64,
}

impl LiveUsage {
    pub fn add_session(&mut self, fold: &SessionFold) {
        let totals = &fold.totals;
        self.input_tokens = self.input_tokens.saturating_add(totals.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(totals.output_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(totals.cache_creation_tokens);
        self.cache_read_tokens = self
            .cache_read_tokens
            .saturating_add(totals.cache_read_tokens);
        self.message_count = self.message_count.saturating_add(totals.message_count);
        self.files_scanned += 1;
        if !fold.is_complete() {
            self.files_failed += 1;
        }
    }

    pub fn has_messages(&self) -> bool {
        self.message_count > 0
    }
}
