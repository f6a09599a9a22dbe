//! Helpers for keeping sequences sorted and free of duplicates.
//!
//! Keys must be totally ordered; floating point data goes through
//! [`OrderedF64`], which compares with [`f64::total_cmp`].

use std::cmp::Ordering;

/// An `f64` with a total order, usable as a sort key.
#[derive(Debug, Clone, Copy)]
pub struct OrderedF64(pub f64);

impl PartialEq for OrderedF64 {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedF64 {}

impl PartialOrd for OrderedF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Sort `items` by `key` and collapse runs of equal keys to their first item.
///
/// The sort is stable, so the surviving item of each run is the one that came
/// first in the input.
pub fn sort_unique<T, K, F>(mut items: Vec<T>, key: F, reverse: bool) -> Vec<T>
where
    F: Fn(&T) -> K,
    K: Ord,
{
    if reverse {
        items.sort_by(|a, b| key(b).cmp(&key(a)));
    } else {
        items.sort_by(|a, b| key(a).cmp(&key(b)));
    }
    items.dedup_by(|later, earlier| key(later) == key(earlier));
    items
}

/// Merge two sorted, deduplicated sequences into one.
///
/// Items of `a` win over items of `b` with the same key.
pub fn merge_sorted<T, K, F>(a: Vec<T>, b: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> K,
    K: Ord,
{
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let mut a = a.into_iter().peekable();
    let mut b = b.into_iter().peekable();
    loop {
        let next = match (a.peek(), b.peek()) {
            (Some(x), Some(y)) => match key(x).cmp(&key(y)) {
                Ordering::Less => a.next(),
                Ordering::Greater => b.next(),
                Ordering::Equal => {
                    b.next();
                    a.next()
                }
            },
            (Some(_), None) => a.next(),
            (None, Some(_)) => b.next(),
            (None, None) => break,
        };
        if let Some(item) = next {
            if merged.last().is_some_and(|last| key(last) == key(&item)) {
                continue;
            }
            merged.push(item);
        }
    }
    merged
}

/// Binary search for the last item preceding `threshold`.
///
/// An item precedes the threshold when its key is strictly less than it, or
/// less than or equal when `maybe_equal` is set. Returns the index of the last
/// such item, `-1` when no item precedes the threshold, and `items.len()` when
/// every item does. Never fails, whatever the threshold.
pub fn search_sorted<T, K, F>(threshold: K, items: &[T], key: F, maybe_equal: bool) -> isize
where
    F: Fn(&T) -> K,
    K: PartialOrd,
{
    let preceding = items.partition_point(|item| {
        let value = key(item);
        if maybe_equal {
            value <= threshold
        } else {
            value < threshold
        }
    });
    if preceding > 0 && preceding == items.len() {
        preceding as isize
    } else {
        preceding as isize - 1
    }
}
