//! Tiered priority queue for waiting requests
//!
//! One FIFO per priority tier, read in tier order. This gives strict
//! critical > high > normal > low ordering with submission order preserved
//! inside a tier, and O(1) push/pop.

use std::collections::VecDeque;

use tokio::time::Instant;

use super::priority::Priority;
use super::request::QueuedRequest;

/// Queue of requests waiting for a concurrency slot
#[derive(Debug, Default)]
pub struct PriorityQueue {
    tiers: [VecDeque<QueuedRequest>; Priority::TIERS],
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request to the tail of its tier
    pub fn push(&mut self, request: QueuedRequest) {
        self.tiers[request.priority().tier_index()].push_back(request);
    }

    /// Remove the head: oldest request of the most urgent non-empty tier
    pub fn pop(&mut self) -> Option<QueuedRequest> {
        self.tiers.iter_mut().find_map(|tier| tier.pop_front())
    }

    /// Look at the request `pop` would return
    pub fn peek(&self) -> Option<&QueuedRequest> {
        self.tiers.iter().find_map(|tier| tier.front())
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(VecDeque::is_empty)
    }

    /// Number of waiting requests in one tier
    pub fn len_of(&self, priority: Priority) -> usize {
        self.tiers[priority.tier_index()].len()
    }

    /// Waiting requests in dispatch order
    pub fn iter(&self) -> impl Iterator<Item = &QueuedRequest> {
        self.tiers.iter().flatten()
    }

    /// Remove every request whose wait exceeded its timeout, in dispatch order
    pub fn drain_expired(&mut self, now: Instant) -> Vec<QueuedRequest> {
        let mut expired = Vec::new();
        for tier in &mut self.tiers {
            if !tier.iter().any(|request| request.is_expired(now)) {
                continue;
            }
            let mut kept = VecDeque::with_capacity(tier.len());
            for request in tier.drain(..) {
                if request.is_expired(now) {
                    expired.push(request);
                } else {
                    kept.push_back(request);
                }
            }
            *tier = kept;
        }
        expired
    }

    /// Remove every waiting request, in dispatch order
    pub fn drain_all(&mut self) -> Vec<QueuedRequest> {
        self.tiers.iter_mut().flat_map(|tier| tier.drain(..)).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;
    use crate::pool::request::RequestHandle;

    fn request(seq: u64, id: &str, priority: Priority, timeout: Duration) -> (QueuedRequest, RequestHandle<()>) {
        QueuedRequest::new("test", seq, id, priority, timeout, || async { Ok::<(), eyre::Report>(()) })
    }

    fn push(queue: &mut PriorityQueue, seq: u64, id: &str, priority: Priority) {
        let (request, _handle) = request(seq, id, priority, Duration::from_secs(60));
        queue.push(request);
    }

    fn pop_ids(queue: &mut PriorityQueue) -> Vec<String> {
        std::iter::from_fn(|| queue.pop()).map(|r| r.id().to_string()).collect()
    }

    #[test]
    fn test_tiers_dispatch_most_urgent_first() {
        let mut queue = PriorityQueue::new();
        push(&mut queue, 1, "A", Priority::Low);
        push(&mut queue, 2, "B", Priority::Critical);
        push(&mut queue, 3, "C", Priority::Normal);
        push(&mut queue, 4, "D", Priority::High);

        assert_eq!(queue.peek().map(|r| r.id()), Some("B"));
        assert_eq!(pop_ids(&mut queue), vec!["B", "D", "C", "A"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fifo_within_tier() {
        let mut queue = PriorityQueue::new();
        push(&mut queue, 1, "X", Priority::Normal);
        push(&mut queue, 2, "Y", Priority::Normal);
        push(&mut queue, 3, "first-critical", Priority::Critical);
        push(&mut queue, 4, "second-critical", Priority::Critical);

        assert_eq!(
            pop_ids(&mut queue),
            vec!["first-critical", "second-critical", "X", "Y"]
        );
    }

    #[test]
    fn test_len_counts_all_tiers() {
        let mut queue = PriorityQueue::new();
        push(&mut queue, 1, "a", Priority::Low);
        push(&mut queue, 2, "b", Priority::Low);
        push(&mut queue, 3, "c", Priority::High);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.len_of(Priority::Low), 2);
        assert_eq!(queue.len_of(Priority::High), 1);
        assert_eq!(queue.len_of(Priority::Critical), 0);

        let ids: Vec<_> = queue.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_expired_keeps_fresh_requests_in_order() {
        let mut queue = PriorityQueue::new();
        let (short, _h1) = request(1, "short", Priority::Normal, Duration::from_millis(10));
        let (long, _h2) = request(2, "long", Priority::Normal, Duration::from_secs(10));
        let (short_low, _h3) = request(3, "short-low", Priority::Low, Duration::from_millis(10));
        let (after, _h4) = request(4, "after", Priority::Normal, Duration::from_secs(10));
        queue.push(short);
        queue.push(long);
        queue.push(short_low);
        queue.push(after);

        tokio::time::advance(Duration::from_millis(20)).await;

        let expired: Vec<_> = queue
            .drain_expired(Instant::now())
            .into_iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(expired, vec!["short", "short-low"]);
        assert_eq!(pop_ids(&mut queue), vec!["long", "after"]);
    }

    #[test]
    fn test_drain_all_empties_queue() {
        let mut queue = PriorityQueue::new();
        push(&mut queue, 1, "a", Priority::Low);
        push(&mut queue, 2, "b", Priority::Critical);

        let drained: Vec<_> = queue.drain_all().into_iter().map(|r| r.id().to_string()).collect();
        assert_eq!(drained, vec!["b", "a"]);
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }

    fn priority_strategy() -> impl Strategy<Value = Priority> {
        prop_oneof![
            Just(Priority::Low),
            Just(Priority::Normal),
            Just(Priority::High),
            Just(Priority::Critical),
        ]
    }

    proptest! {
        #[test]
        fn prop_pop_order_is_stable_sort_by_tier(priorities in prop::collection::vec(priority_strategy(), 0..64)) {
            let mut queue = PriorityQueue::new();
            for (seq, priority) in priorities.iter().enumerate() {
                push(&mut queue, seq as u64, &seq.to_string(), *priority);
            }

            let mut expected: Vec<(usize, Priority)> = priorities.iter().copied().enumerate().collect();
            expected.sort_by_key(|(_, priority)| priority.tier_index());
            let expected: Vec<u64> = expected.into_iter().map(|(seq, _)| seq as u64).collect();

            let actual: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|r| r.seq()).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
