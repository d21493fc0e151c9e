//! Ordering helpers for sorted views and sorted index buckets.
//!
//! Comparators are strict "sorts before" predicates supplied by the user.
//! Nothing here assumes they form a total order: the sort never panics and
//! ties keep their existing order.

use livedb_core::Row;
use std::rc::Rc;

/// "`a` sorts before `b`".
pub type Comparator = Rc<dyn Fn(&Row, &Row) -> bool>;

/// Comparator plus the policy for members whose state changes.
#[derive(Clone)]
pub(crate) struct SortOrder {
    pub less: Comparator,
    /// Reposition members on change instead of only forwarding the change.
    pub resort: bool,
}

impl SortOrder {
    pub fn new(less: Comparator, resort: bool) -> Self {
        Self { less, resort }
    }
}

const INSERTION_THRESHOLD: usize = 8;

pub(crate) fn is_sorted_by<T, F>(items: &[T], less: &mut F) -> bool
where
    F: FnMut(&T, &T) -> bool,
{
    items.windows(2).all(|w| !less(&w[1], &w[0]))
}

/// Stable sort. Already ordered input costs `len - 1` comparisons.
pub(crate) fn stable_sort_by<T, F>(items: &mut [T], mut less: F)
where
    T: Copy,
    F: FnMut(&T, &T) -> bool,
{
    if items.len() < 2 || is_sorted_by(items, &mut less) {
        return;
    }
    let mut buf = items.to_vec();
    merge_sort(items, &mut buf, &mut less);
}

fn merge_sort<T, F>(v: &mut [T], buf: &mut [T], less: &mut F)
where
    T: Copy,
    F: FnMut(&T, &T) -> bool,
{
    let n = v.len();
    if n <= INSERTION_THRESHOLD {
        for i in 1..n {
            let x = v[i];
            let mut j = i;
            while j > 0 && less(&x, &v[j - 1]) {
                v[j] = v[j - 1];
                j -= 1;
            }
            v[j] = x;
        }
        return;
    }

    let mid = n / 2;
    {
        let (left, right) = v.split_at_mut(mid);
        let (buf_left, buf_right) = buf.split_at_mut(mid);
        merge_sort(left, buf_left, less);
        merge_sort(right, buf_right, less);
    }
    if !less(&v[mid], &v[mid - 1]) {
        return;
    }

    buf.copy_from_slice(v);
    let (mut i, mut j, mut k) = (0, mid, 0);
    while i < mid && j < n {
        // take from the right only when strictly before: keeps ties stable
        if less(&buf[j], &buf[i]) {
            v[k] = buf[j];
            j += 1;
        } else {
            v[k] = buf[i];
            i += 1;
        }
        k += 1;
    }
    v[k..k + (mid - i)].copy_from_slice(&buf[i..mid]);
    let k = k + (mid - i);
    v[k..].copy_from_slice(&buf[j..n]);
}

/// Upper-bound insertion point for a new element.
///
/// `before(x)` answers "the new element sorts before `x`". Ties go after
/// existing elements, and an element not before the last one is appended
/// after a single comparison.
pub(crate) fn insertion_point<T, F>(items: &[T], mut before: F) -> usize
where
    F: FnMut(&T) -> bool,
{
    let Some(last) = items.last() else {
        return 0;
    };
    if !before(last) {
        return items.len();
    }
    let (mut lo, mut hi) = (0, items.len() - 1);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if before(&items[mid]) {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

/// True if the element at `pos` is ordered wrongly against a neighbour.
pub(crate) fn out_of_place<T, F>(items: &[T], pos: usize, mut less: F) -> bool
where
    F: FnMut(&T, &T) -> bool,
{
    let item = &items[pos];
    (pos > 0 && less(item, &items[pos - 1]))
        || (pos + 1 < items.len() && less(&items[pos + 1], item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;

    #[test]
    fn test_sorted_input_is_linear() {
        let calls = Cell::new(0);
        let mut items: Vec<u32> = (0..1000).collect();
        stable_sort_by(&mut items, |a, b| {
            calls.set(calls.get() + 1);
            a < b
        });
        assert_eq!(calls.get(), 999);
    }

    #[test]
    fn test_stable_ties() {
        // (key, tag): equal keys must keep tag order
        let mut items = vec![(2, 0), (1, 1), (2, 2), (1, 3), (0, 4), (2, 5)];
        stable_sort_by(&mut items, |a, b| a.0 < b.0);
        assert_eq!(items, vec![(0, 4), (1, 1), (1, 3), (2, 0), (2, 2), (2, 5)]);
    }

    #[test]
    fn test_inconsistent_comparator_does_not_panic() {
        let mut items: Vec<u32> = (0..64).rev().collect();
        let mut flip = false;
        stable_sort_by(&mut items, |_, _| {
            flip = !flip;
            flip
        });
        assert_eq!(items.len(), 64);
    }

    #[test]
    fn test_insertion_point() {
        let items = [1, 3, 3, 5];
        assert_eq!(insertion_point(&items, |x| 0 < *x), 0);
        assert_eq!(insertion_point(&items, |x| 3 < *x), 3);
        assert_eq!(insertion_point(&items, |x| 4 < *x), 3);
        assert_eq!(insertion_point(&items, |x| 9 < *x), 4);
        assert_eq!(insertion_point(&[] as &[i32], |_| true), 0);
    }

    #[test]
    fn test_append_fast_path_single_comparison() {
        let items: Vec<i32> = (0..100).collect();
        let mut calls = 0;
        let pos = insertion_point(&items, |x| {
            calls += 1;
            200 < *x
        });
        assert_eq!(pos, 100);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_out_of_place() {
        let items = [1, 5, 3, 7];
        assert!(out_of_place(&items, 1, |a, b| a < b));
        assert!(out_of_place(&items, 2, |a, b| a < b));
        assert!(!out_of_place(&items, 0, |a, b| a < b));
        assert!(!out_of_place(&items, 3, |a, b| a < b));
    }

    proptest! {
        #[test]
        fn prop_matches_std_stable_sort(items in prop::collection::vec((0u8..10, 0u16..1000), 0..200)) {
            let mut ours = items.clone();
            stable_sort_by(&mut ours, |a, b| a.0 < b.0);
            let mut expected = items;
            expected.sort_by_key(|x| x.0);
            prop_assert_eq!(ours, expected);
        }

        #[test]
        fn prop_insertion_keeps_order(mut items in prop::collection::vec(0i32..50, 0..50), x in 0i32..50) {
            items.sort();
            let pos = insertion_point(&items, |y| x < *y);
            items.insert(pos, x);
            prop_assert!(items.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
