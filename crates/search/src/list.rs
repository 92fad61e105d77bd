//! The list engine: filter, transform, sort, window.

use std::time::Instant;

use kquery_core::{Filter, ListResult, PageInfo, Query};
use tracing::debug;

use crate::meta::{CompareFn, FilterFn, TransformFn};

/// Evaluate `q` over `objects`.
///
/// Steps: keep objects satisfying every filter clause, run `transforms` over the
/// survivors in order, sort, then cut the requested page. `total` in the result counts
/// the survivors before windowing.
///
/// Descending order places `a` before `b` when `compare(a, b)`; ascending when
/// `!compare(a, b)`. The comparator is never called with swapped arguments to emulate
/// ascending order. In descending order, objects the comparator cannot tell apart keep
/// their input order.
pub fn default_list<T>(
    objects: Vec<T>,
    q: &Query,
    compare: &CompareFn<'_, T>,
    filter: &FilterFn<'_, T>,
    transforms: &[&TransformFn<'_, T>],
) -> ListResult<T> {
    let started = Instant::now();
    let input = objects.len();
    let clauses: Vec<Filter> = q.filters.iter().map(|(f, v)| Filter { field: f.clone(), value: v.clone() }).collect();

    let kept: Vec<T> = objects
        .into_iter()
        .filter(|obj| clauses.iter().all(|c| filter(obj, c)))
        .map(|obj| transforms.iter().fold(obj, |acc, t| t(acc)))
        .collect();

    let sort_by = &q.sort_by;
    let ascending = q.ascending;
    let before = |a: &T, b: &T| if ascending { !compare(a, b, sort_by) } else { compare(a, b, sort_by) };
    let mut kept = stable_sort(kept, &before);

    let pagination = q.pagination();
    let total = kept.len();
    let window = pagination.valid_window(total);
    let data: Vec<T> = kept.drain(window).collect();

    let took_ms = started.elapsed().as_secs_f64() * 1000.0;
    debug!(input, total, returned = data.len(), sort_by = %sort_by, ascending, took_ms, "list evaluated");
    metrics::histogram!("list_eval_ms", took_ms);
    metrics::counter!("list_filtered_total", (input - total) as u64);

    ListResult {
        data,
        pagination: PageInfo { limit: pagination.limit, total, offset: pagination.offset, page: pagination.page },
    }
}

// Top-down merge sort on a "goes before" predicate. An element from the right run only
// overtakes the left one when `before(right, left)`, so the result is deterministic even
// when the predicate is not a strict weak order.
fn stable_sort<T>(items: Vec<T>, before: &dyn Fn(&T, &T) -> bool) -> Vec<T> {
    if items.len() <= 1 {
        return items;
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = stable_sort(left, before);
    let right = stable_sort(right, before);

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut l = left.into_iter().peekable();
    let mut r = right.into_iter().peekable();
    loop {
        let take_right = match (l.peek(), r.peek()) {
            (Some(a), Some(b)) => before(b, a),
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        out.extend(if take_right { r.next() } else { l.next() });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kquery_core::{Field, Pagination, NO_PAGINATION};

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: String,
        rank: i64,
        tag: &'static str,
    }

    fn items(n: i64) -> Vec<Item> {
        (0..n).map(|i| Item { name: format!("item-{i:02}"), rank: i, tag: if i % 2 == 0 { "even" } else { "odd" } }).collect()
    }

    fn by_rank(a: &Item, b: &Item, _: &Field) -> bool { a.rank > b.rank }

    fn by_tag(o: &Item, f: &Filter) -> bool {
        match f.field.as_str() {
            "tag" => o.tag == f.value.as_str(),
            _ => false,
        }
    }

    fn ranks(r: &ListResult<Item>) -> Vec<i64> { r.data.iter().map(|i| i.rank).collect() }

    #[test]
    fn second_page_of_twenty_five() {
        let q = Query::new().with_pagination(10, 2);
        let res = default_list(items(25), &q, &by_rank, &by_tag, &[]);
        assert_eq!(ranks(&res), (5..15).rev().collect::<Vec<_>>());
        assert_eq!(res.pagination, PageInfo { limit: 10, total: 25, offset: 10, page: 2 });
    }

    #[test]
    fn no_pagination_returns_all_descending() {
        let res = default_list(items(5), &Query::new(), &by_rank, &by_tag, &[]);
        assert_eq!(ranks(&res), vec![4, 3, 2, 1, 0]);
        assert_eq!(res.pagination.total, 5);
        assert_eq!(res.pagination.limit, NO_PAGINATION.limit);
    }

    #[test]
    fn ascending_inverts_the_comparator() {
        let q = Query::new().with_sort("rank", true);
        let res = default_list(items(5), &q, &by_rank, &by_tag, &[]);
        assert_eq!(ranks(&res), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn filters_are_anded_and_total_counts_survivors() {
        let q = Query::new().with_filter("tag", "odd").with_pagination(2, 1);
        let res = default_list(items(9), &q, &by_rank, &by_tag, &[]);
        assert_eq!(ranks(&res), vec![7, 5]);
        assert_eq!(res.pagination.total, 4);

        let q = Query::new().with_filter("tag", "odd").with_filter("unknown", "x");
        assert!(default_list(items(9), &q, &by_rank, &by_tag, &[]).data.is_empty());
    }

    #[test]
    fn offset_past_end_is_empty_but_total_is_kept() {
        let mut q = Query::new();
        q.pagination = Some(Pagination::new(10, 30, 4));
        let res = default_list(items(25), &q, &by_rank, &by_tag, &[]);
        assert!(res.data.is_empty());
        assert_eq!(res.pagination.total, 25);
    }

    #[test]
    fn missing_pagination_block_is_no_pagination() {
        let mut q = Query::new();
        q.pagination = None;
        let res = default_list(items(3), &q, &by_rank, &by_tag, &[]);
        assert_eq!(res.data.len(), 3);
        assert_eq!(res.pagination.limit, -1);
        assert_eq!(res.pagination.page, 1);
        assert!(q.pagination.is_none());
    }

    #[test]
    fn transforms_run_on_survivors_in_order() {
        use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
        let calls = AtomicUsize::new(0);
        let double = |mut i: Item| {
            calls.fetch_add(1, AtomicOrdering::SeqCst);
            i.rank *= 2;
            i
        };
        let plus_one = |mut i: Item| {
            i.rank += 1;
            i
        };
        let q = Query::new().with_filter("tag", "even");
        let res = default_list(items(6), &q, &by_rank, &by_tag, &[&double, &plus_one]);
        // evens 0,2,4 -> doubled then incremented
        assert_eq!(ranks(&res), vec![9, 5, 1]);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 3);
    }

    #[test]
    fn transforms_see_sorted_key_after_enrichment() {
        let negate = |mut i: Item| {
            i.rank = -i.rank;
            i
        };
        let res = default_list(items(4), &Query::new(), &by_rank, &by_tag, &[&negate]);
        assert_eq!(ranks(&res), vec![0, -1, -2, -3]);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let q = Query::new().with_filter("tag", "odd").with_pagination(3, 1);
        let a = default_list(items(20), &q, &by_rank, &by_tag, &[]);
        let b = default_list(items(20), &q, &by_rank, &by_tag, &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn ties_keep_input_order() {
        let never = |_: &Item, _: &Item, _: &Field| false;
        let res = default_list(items(5), &Query::new(), &never, &by_tag, &[]);
        assert_eq!(ranks(&res), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn closures_may_borrow_request_state() {
        let wanted = String::from("odd");
        let bonus = vec![100i64];
        let filter = |o: &Item, f: &Filter| f.value.as_str() == wanted && o.tag == wanted.as_str();
        let compare = |a: &Item, b: &Item, _: &Field| a.rank + bonus[0] > b.rank + bonus[0];
        let bump = |mut i: Item| {
            i.rank += bonus[0];
            i
        };
        let q = Query::new().with_filter("tag", "odd");
        let res = default_list(items(5), &q, &compare, &filter, &[&bump]);
        assert_eq!(ranks(&res), vec![103, 101]);
    }

    #[test]
    fn inconsistent_comparator_still_terminates_deterministically() {
        // odd ranks claim to beat everything, evens claim nothing
        let odd_wins = |a: &Item, _: &Item, _: &Field| a.rank % 2 == 1;
        let a = default_list(items(9), &Query::new(), &odd_wins, &by_tag, &[]);
        let b = default_list(items(9), &Query::new(), &odd_wins, &by_tag, &[]);
        assert_eq!(a.data.len(), 9);
        assert_eq!(a, b);
    }
}
