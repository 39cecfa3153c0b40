use super::UsageEvent;
use serde_json::Value;

const ASSISTANT_KIND: &str = "assistant";

/// Decodes one session log line into a usage event.
///
/// Anything that is not an assistant turn carrying a `message.usage` object
/// yields `None`, including lines that are not valid JSON at all.
pub fn parse_line(line: &str) -> Option<UsageEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    if value.get("type").and_then(|v| v.as_str()) != Some(ASSISTANT_KIND) {
        return None;
    }
    let usage = value.get("message")?.get("usage")?;
    if !usage.is_object() {
        return None;
    }

    let request_id = value
        .get("requestId")
        .and_then(|v| v.as_str())
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string());

    Some(UsageEvent {
        request_id,
        input_tokens: counter(usage, "input_tokens"),
        output_tokens: counter(usage, "output_tokens"),
        cache_creation_tokens: counter(usage, "cache_creation_input_tokens"),
        cache_read_tokens: counter(usage, "cache_read_input_tokens"),
    })
}

// Integral floats such as `12.0` count; negative or fractional counters read
// as absent.
fn counter(usage: &Value, key: &str) -> u64 {
    let Some(value) = usage.get(key) else {
        return 0;
    };
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|n| n.is_finite() && *n >= 0.0 && n.fract() == 0.0)
                .map(|n| n as u64)
        })
        .unwrap_or(0)
}
