use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

type RequestKey = (String, String);

/// Last-request-wins bookkeeping per `(user_id, pack_id)`.
///
/// The map is only touched in short synchronous sections, so a blocking mutex
/// is used. That lets a ticket release itself from `Drop` when the request
/// future is cancelled, for example when the client disconnects mid-fetch.
#[derive(Debug, Default)]
pub struct RequestTracker {
    next_sequence: AtomicU64,
    latest: Mutex<HashMap<RequestKey, u64>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn latest(&self) -> MutexGuard<'_, HashMap<RequestKey, u64>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin(&self, user_id: &str, pack_id: &str) -> RequestTicket<'_> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let key = (user_id.to_string(), pack_id.to_string());

        self.latest().insert(key.clone(), sequence);

        RequestTicket {
            tracker: self,
            key,
            sequence,
        }
    }

    /// Remove the entry for `key` if it still belongs to `sequence`.
    fn release(&self, key: &RequestKey, sequence: u64) -> bool {
        let mut latest = self.latest();
        if latest.get(key) != Some(&sequence) {
            return false;
        }

        latest.remove(key);
        true
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.latest().len()
    }
}

/// Held while a request runs; only the latest ticket per key may publish its
/// result. Dropping the ticket releases its entry.
#[derive(Debug)]
pub struct RequestTicket<'a> {
    tracker: &'a RequestTracker,
    key: RequestKey,
    sequence: u64,
}

impl RequestTicket<'_> {
    pub fn is_current(&self) -> bool {
        self.tracker.latest().get(&self.key) == Some(&self.sequence)
    }

    /// Close the ticket. Returns `false` when a newer request took over, in
    /// which case the caller must discard its result.
    pub fn complete(self) -> bool {
        self.tracker.release(&self.key, self.sequence)
    }
}

impl Drop for RequestTicket<'_> {
    fn drop(&mut self) {
        self.tracker.release(&self.key, self.sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_request_supersedes_older() {
        let tracker = RequestTracker::new();

        let first = tracker.begin("1", "gold");
        let second = tracker.begin("1", "gold");

        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(!first.complete());
        assert!(second.complete());
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn keys_are_independent() {
        let tracker = RequestTracker::new();

        let gold = tracker.begin("1", "gold");
        let silver = tracker.begin("1", "silver");
        let other_user = tracker.begin("2", "gold");

        assert!(gold.complete());
        assert!(silver.complete());
        assert!(other_user.complete());
    }

    #[test]
    fn dropped_ticket_releases_its_entry() {
        let tracker = RequestTracker::new();

        let ticket = tracker.begin("1", "gold");
        assert_eq!(tracker.in_flight(), 1);

        drop(ticket);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn dropping_stale_ticket_keeps_newer_entry() {
        let tracker = RequestTracker::new();

        let first = tracker.begin("1", "gold");
        let second = tracker.begin("1", "gold");

        drop(first);
        assert!(second.is_current());
        assert_eq!(tracker.in_flight(), 1);
    }
}
