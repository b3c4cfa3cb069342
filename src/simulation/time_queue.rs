use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub trait EndTime {
    fn end_time(&self, now: u32) -> u32;
}

struct Entry<T>
where
    T: EndTime,
{
    end_time: u32,
    order: u64,
    value: T,
}

impl<T> PartialEq<Self> for Entry<T>
where
    T: EndTime,
{
    fn eq(&self, other: &Self) -> bool {
        self.end_time == other.end_time && self.order == other.order
    }
}

impl<T> Eq for Entry<T> where T: EndTime {}

impl<T> PartialOrd<Self> for Entry<T>
where
    T: EndTime,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T>
where
    T: EndTime,
{
    // reversed for the max heap. Values with the same end time come out in insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .end_time
            .cmp(&self.end_time)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Values ordered by their end time. Values with the same end time are popped in the order they
/// were added, which keeps runs reproducible.
pub struct TimeQueue<T>
where
    T: EndTime,
{
    q: BinaryHeap<Entry<T>>,
    counter: u64,
}

impl<T> Default for TimeQueue<T>
where
    T: EndTime,
{
    fn default() -> Self {
        TimeQueue::new()
    }
}

impl<T> std::fmt::Debug for TimeQueue<T>
where
    T: EndTime,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeQueue").field("len", &self.len()).finish()
    }
}

impl<T> TimeQueue<T>
where
    T: EndTime,
{
    pub fn new() -> Self {
        TimeQueue {
            q: BinaryHeap::new(),
            counter: 0,
        }
    }

    pub fn add(&mut self, value: T, now: u32) {
        let end_time = value.end_time(now);
        self.counter += 1;
        self.q.push(Entry {
            end_time,
            order: self.counter,
            value,
        });
    }

    /// All values with an end time up to and including `now`.
    pub fn pop(&mut self, now: u32) -> Vec<T> {
        let mut result: Vec<T> = Vec::new();

        while self.q.peek().is_some_and(|e| e.end_time <= now) {
            if let Some(entry) = self.q.pop() {
                result.push(entry.value);
            }
        }

        result
    }

    pub fn next_end_time(&self) -> Option<u32> {
        self.q.peek().map(|e| e.end_time)
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }
}
