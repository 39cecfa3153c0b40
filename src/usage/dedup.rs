use std::collections::HashSet;

/// Tracks which request ids have already been counted within one session file.
#[derive(Debug, Default)]
pub struct RequestDeduplicator {
    seen: HashSet<String>,
}

impl RequestDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the event should be counted.
    ///
    /// Events without a request id are always counted; an id is counted only
    /// the first time it shows up.
    pub fn first_sighting(&mut self, request_id: Option<&str>) -> bool {
        match request_id {
            Some(id) => {
                if self.seen.contains(id) {
                    false
                } else {
                    self.seen.insert(id.to_string());
                    true
                }
            }
            None => true,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_id_is_counted_once() {
        let mut dedup = RequestDeduplicator::new();
        assert!(dedup.first_sighting(Some("req_a")));
        assert!(!dedup.first_sighting(Some("req_a")));
        assert!(dedup.first_sighting(Some("req_b")));
        assert!(!dedup.first_sighting(Some("req_b")));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn missing_id_is_never_deduplicated() {
        let mut dedup = RequestDeduplicator::new();
        assert!(dedup.first_sighting(None));
        assert!(dedup.first_sighting(None));
        assert_eq!(dedup.len(), 0);
    }

    #[test]
    fn scopes_are_independent() {
        let mut first = RequestDeduplicator::new();
        let mut second = RequestDeduplicator::new();
        assert!(first.first_sighting(Some("req_shared")));
        assert!(second.first_sighting(Some("req_shared")));
    }
}
