use crate::{snapshot::StatsSnapshot, usage::LiveUsage};
use chrono::NaiveDate;
use serde::Serialize;

/// Where the "today" figures of a [`DashboardMetrics`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TodaySource {
    Live,
    Snapshot,
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelBreakdown {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveScanStats {
    pub files_scanned: u64,
    pub files_failed: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub total_sessions: u64,
    pub total_messages: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cache_read_tokens: u64,
    pub total_cache_write_tokens: u64,
    pub today_messages: u64,
    pub today_tool_calls: u64,
    pub today_input_tokens: u64,
    pub today_output_tokens: u64,
    pub today_cache_read_tokens: u64,
    pub today_cache_creation_tokens: u64,
    pub today_source: TodaySource,
    pub live_scan: LiveScanStats,
    pub model_breakdown: Vec<ModelBreakdown>,
}

/// Combines the snapshot's history with today's live usage.
///
/// Returns `None` when there is no snapshot. Live counters win for today as
/// soon as the scan saw at least one message, even if some files failed to
/// read; `live_scan.files_failed` exposes that case.
pub fn merge(
    snapshot: Option<&StatsSnapshot>,
    live: &LiveUsage,
    today: NaiveDate,
) -> Option<DashboardMetrics> {
    let snapshot = snapshot?;

    let mut total_input_tokens = 0u64;
    let mut total_output_tokens = 0u64;
    let mut total_cache_read_tokens = 0u64;
    let mut total_cache_write_tokens = 0u64;
    let mut model_breakdown = Vec::with_capacity(snapshot.model_usage.len());

    for (model, usage) in &snapshot.model_usage {
        total_input_tokens = total_input_tokens.saturating_add(usage.input_tokens);
        total_output_tokens = total_output_tokens.saturating_add(usage.output_tokens);
        total_cache_read_tokens =
            total_cache_read_tokens.saturating_add(usage.cache_read_input_tokens);
        total_cache_write_tokens = total_cache_write_tokens
            .saturating_add(usage.cache_write_tokens());

        model_breakdown.push(ModelBreakdown {
            model: model.clone(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_read_tokens: usage.cache_read_input_tokens,
            total_tokens: usage.input_tokens.saturating_add(usage.output_tokens),
        });
    }
    model_breakdown.sort_by(|a, b| b.total_tokens.cmp(&a.total_tokens));

    let today_key = today.format("%Y-%m-%d").to_string();
    let today_activity = snapshot.activity_on(&today_key);

    let (today_messages, today_source) = if live.has_messages() {
        (live.message_count, TodaySource::Live)
    } else if let Some(activity) = today_activity {
        (activity.message_count, TodaySource::Snapshot)
    } else {
        (0, TodaySource::None)
    };

    Some(DashboardMetrics {
        total_sessions: snapshot.total_sessions,
        total_messages: snapshot.total_messages,
        total_input_tokens,
        total_output_tokens,
        total_cache_read_tokens,
        total_cache_write_tokens,
        today_messages,
        today_tool_calls: today_activity.map(|a| a.tool_call_count).unwrap_or(0),
        today_input_tokens: live.input_tokens,
        today_output_tokens: live.output_tokens,
        today_cache_read_tokens: live.cache_read_tokens,
        today_cache_creation_tokens: live.cache_creation_tokens,
        today_source,
        live_scan: LiveScanStats {
            files_scanned: live.files_scanned,
            files_failed: live.files_failed,
        },
        model_breakdown,
    })
}
