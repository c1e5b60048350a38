//! Binary min-heap of grid events. Lower `Priority` numeric value pops
//! first; ties are broken arbitrarily (the event payload carries no
//! secondary ordering key, matching the original's dataclass comparison
//! which only orders on `priority`).

use crate::ids::NodeId;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    LoadChange,
    NodeFailure,
    Maintenance,
    OverloadWarning,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub priority: Priority,
    pub tick: u64,
    pub event_type: EventType,
    pub node_id: NodeId,
    pub payload: Option<String>,
}

impl Event {
    pub fn new(priority: Priority, tick: u64, event_type: EventType, node_id: NodeId) -> Self {
        Self { priority, tick, event_type, node_id, payload: None }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}
impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    /// Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap on
    /// `priority`: CRITICAL (0) is "greatest" and pops first.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.priority.cmp(&self.priority)
    }
}

#[derive(Debug, Default, Clone)]
pub struct QueueStatistics {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub load_change: usize,
    pub node_failure: usize,
    pub maintenance: usize,
    pub overload_warning: usize,
    pub oldest_tick: Option<u64>,
    pub newest_tick: Option<u64>,
}

/// Priority event queue with an optional size cap. When the cap is hit,
/// LOW events are evicted first to make room; if none exist the incoming
/// event is dropped (unless it is itself LOW, which is dropped outright).
pub struct PriorityQueue {
    heap: BinaryHeap<Event>,
    max_size: Option<usize>,
}

impl PriorityQueue {
    pub fn new(max_size: Option<usize>) -> Self {
        Self { heap: BinaryHeap::new(), max_size }
    }

    /// Removes any existing event with the same `(node_id, event_type)`
    /// before inserting, unless `check_duplicates` is false. Returns
    /// whether the event was actually enqueued.
    pub fn push(&mut self, event: Event, check_duplicates: bool) -> bool {
        if check_duplicates {
            self.remove_event(event.node_id, event.event_type);
        }

        if let Some(max) = self.max_size {
            if self.heap.len() >= max {
                if event.priority == Priority::Low {
                    return false;
                }
                if !self.evict_one_low() {
                    return false;
                }
            }
        }

        self.heap.push(event);
        true
    }

    fn evict_one_low(&mut self) -> bool {
        let items: Vec<Event> = self.heap.drain().collect();
        let mut evicted = false;
        let mut rebuilt = BinaryHeap::new();
        for item in items {
            if !evicted && item.priority == Priority::Low {
                evicted = true;
                continue;
            }
            rebuilt.push(item);
        }
        self.heap = rebuilt;
        evicted
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&Event> {
        self.heap.peek()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn size(&self) -> usize {
        self.heap.len()
    }

    /// All events in priority order, without removing them.
    pub fn get_all_events(&self) -> Vec<Event> {
        let mut all: Vec<Event> = self.heap.iter().cloned().collect();
        all.sort();
        all.reverse();
        all
    }

    pub fn get_events_by_priority(&self, priority: Priority) -> Vec<Event> {
        self.heap.iter().filter(|e| e.priority == priority).cloned().collect()
    }

    pub fn get_events_by_node(&self, node_id: NodeId) -> Vec<Event> {
        self.heap.iter().filter(|e| e.node_id == node_id).cloned().collect()
    }

    pub fn has_event(&self, node_id: NodeId, event_type: EventType) -> bool {
        self.heap.iter().any(|e| e.node_id == node_id && e.event_type == event_type)
    }

    pub fn remove_event(&mut self, node_id: NodeId, event_type: EventType) -> bool {
        let before = self.heap.len();
        let retained: Vec<Event> = self
            .heap
            .drain()
            .filter(|e| !(e.node_id == node_id && e.event_type == event_type))
            .collect();
        let removed = retained.len() < before;
        self.heap = retained.into_iter().collect();
        removed
    }

    /// Re-keys an existing `(node_id, event_type)` event to `new_priority`,
    /// preserving its tick and payload.
    pub fn update_priority(&mut self, node_id: NodeId, event_type: EventType, new_priority: Priority) -> bool {
        let existing = self
            .heap
            .iter()
            .find(|e| e.node_id == node_id && e.event_type == event_type)
            .cloned();
        let Some(mut event) = existing else {
            return false;
        };
        self.remove_event(node_id, event_type);
        event.priority = new_priority;
        self.heap.push(event);
        true
    }

    /// Drops events older than `max_age_ticks` relative to `current_tick`.
    /// Returns the number removed.
    pub fn clear_old_events(&mut self, current_tick: u64, max_age_ticks: u64) -> usize {
        self.clear_by_filter(|e| current_tick.saturating_sub(e.tick) > max_age_ticks)
    }

    pub fn clear_by_priority(&mut self, priority: Priority) -> usize {
        self.clear_by_filter(|e| e.priority == priority)
    }

    /// Removes every event for which `filter` returns true; returns the count removed.
    pub fn clear_by_filter(&mut self, filter: impl Fn(&Event) -> bool) -> usize {
        let before = self.heap.len();
        let retained: Vec<Event> = self.heap.drain().filter(|e| !filter(e)).collect();
        let removed = before - retained.len();
        self.heap = retained.into_iter().collect();
        removed
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn get_statistics(&self) -> QueueStatistics {
        if self.heap.is_empty() {
            return QueueStatistics::default();
        }
        let mut stats = QueueStatistics { total: self.heap.len(), ..Default::default() };
        for e in self.heap.iter() {
            match e.priority {
                Priority::Critical => stats.critical += 1,
                Priority::High => stats.high += 1,
                Priority::Medium => stats.medium += 1,
                Priority::Low => stats.low += 1,
            }
            match e.event_type {
                EventType::LoadChange => stats.load_change += 1,
                EventType::NodeFailure => stats.node_failure += 1,
                EventType::Maintenance => stats.maintenance += 1,
                EventType::OverloadWarning => stats.overload_warning += 1,
            }
            stats.oldest_tick = Some(stats.oldest_tick.map_or(e.tick, |t| t.min(e.tick)));
            stats.newest_tick = Some(stats.newest_tick.map_or(e.tick, |t| t.max(e.tick)));
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(priority: Priority, tick: u64, node: u64) -> Event {
        Event::new(priority, tick, EventType::LoadChange, NodeId(node))
    }

    #[test]
    fn test_critical_pops_before_low() {
        let mut q = PriorityQueue::new(None);
        q.push(ev(Priority::Low, 1, 1), true);
        q.push(ev(Priority::Critical, 2, 2), true);
        q.push(ev(Priority::Medium, 3, 3), true);
        assert_eq!(q.pop().unwrap().priority, Priority::Critical);
        assert_eq!(q.pop().unwrap().priority, Priority::Medium);
        assert_eq!(q.pop().unwrap().priority, Priority::Low);
    }

    #[test]
    fn test_duplicate_node_and_type_replaces_existing() {
        let mut q = PriorityQueue::new(None);
        q.push(ev(Priority::Low, 1, 7), true);
        q.push(ev(Priority::Critical, 2, 7), true);
        assert_eq!(q.size(), 1);
        assert_eq!(q.peek().unwrap().priority, Priority::Critical);
    }

    #[test]
    fn test_max_size_evicts_low_first() {
        let mut q = PriorityQueue::new(Some(2));
        assert!(q.push(ev(Priority::Low, 1, 1), true));
        assert!(q.push(ev(Priority::High, 2, 2), true));
        assert!(q.push(ev(Priority::Critical, 3, 3), true));
        assert_eq!(q.size(), 2);
        assert!(!q.get_all_events().iter().any(|e| e.priority == Priority::Low));
    }

    #[test]
    fn test_max_size_drops_incoming_low_when_full_of_high_priority() {
        let mut q = PriorityQueue::new(Some(1));
        assert!(q.push(ev(Priority::Critical, 1, 1), true));
        assert!(!q.push(ev(Priority::Low, 2, 2), true));
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn test_update_priority_rekeys_event() {
        let mut q = PriorityQueue::new(None);
        q.push(ev(Priority::Low, 1, 9), true);
        assert!(q.update_priority(NodeId(9), EventType::LoadChange, Priority::Critical));
        assert_eq!(q.peek().unwrap().priority, Priority::Critical);
    }

    #[test]
    fn test_clear_old_events_by_age() {
        let mut q = PriorityQueue::new(None);
        q.push(ev(Priority::Medium, 1, 1), true);
        q.push(ev(Priority::Medium, 50, 2), true);
        let removed = q.clear_old_events(50, 10);
        assert_eq!(removed, 1);
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn test_get_statistics_counts_by_priority() {
        let mut q = PriorityQueue::new(None);
        q.push(ev(Priority::Critical, 1, 1), true);
        q.push(ev(Priority::Critical, 2, 2), true);
        q.push(ev(Priority::Low, 3, 3), true);
        let stats = q.get_statistics();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.critical, 2);
        assert_eq!(stats.low, 1);
    }

    #[test]
    fn test_get_statistics_counts_by_event_type() {
        let mut q = PriorityQueue::new(None);
        q.push(Event::new(Priority::High, 1, EventType::NodeFailure, NodeId(1)), true);
        q.push(Event::new(Priority::Medium, 2, EventType::OverloadWarning, NodeId(2)), true);
        q.push(Event::new(Priority::Low, 3, EventType::OverloadWarning, NodeId(3)), true);
        let stats = q.get_statistics();
        assert_eq!(stats.node_failure, 1);
        assert_eq!(stats.overload_warning, 2);
        assert_eq!(stats.load_change, 0);
        assert_eq!(stats.maintenance, 0);
    }
}
