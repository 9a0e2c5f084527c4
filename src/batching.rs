//! Order-preserving batching for calls to the embedding provider
//!
//! Both modes consume their input and return non-empty groups that, concatenated
//! in order, reproduce the input exactly once each.

/// Group items into runs of at most `size` consecutive items
///
/// The final group may be shorter. A `size` of zero is treated as one.
pub fn batch_fixed<T>(items: impl IntoIterator<Item = T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut batches = Vec::new();
    let mut bucket = Vec::with_capacity(size);

    for item in items {
        bucket.push(item);
        if bucket.len() >= size {
            batches.push(std::mem::replace(&mut bucket, Vec::with_capacity(size)));
        }
    }

    if !bucket.is_empty() {
        batches.push(bucket);
    }
    batches
}

/// Group items so each group's cumulative size stays within `max_total`
///
/// Before item `i` is added, the current group is closed if it is non-empty and
/// either `total + size(i) > max_total` or it already holds `max_items` items.
/// An item larger than `max_total` on its own is never split or dropped; it ends
/// up alone in its group.
pub fn batch_by_size<T, F>(
    items: impl IntoIterator<Item = T>,
    mut size_of: F,
    max_total: usize,
    max_items: Option<usize>,
) -> Vec<Vec<T>>
where
    F: FnMut(&T) -> usize,
{
    let mut batches = Vec::new();
    let mut bucket: Vec<T> = Vec::new();
    let mut total = 0usize;

    for item in items {
        let size = size_of(&item);
        let at_item_cap = max_items.is_some_and(|cap| cap > 0 && bucket.len() >= cap);

        if !bucket.is_empty() && (total.saturating_add(size) > max_total || at_item_cap) {
            batches.push(std::mem::take(&mut bucket));
            total = 0;
        }

        total = total.saturating_add(size);
        bucket.push(item);
    }

    if !bucket.is_empty() {
        batches.push(bucket);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_fixed_example() {
        assert_eq!(
            batch_fixed(vec![1, 2, 3, 4, 5], 2),
            vec![vec![1, 2], vec![3, 4], vec![5]]
        );
    }

    #[test]
    fn test_batch_fixed_exact_multiple() {
        assert_eq!(
            batch_fixed(vec![1, 2, 3, 4], 2),
            vec![vec![1, 2], vec![3, 4]]
        );
    }

    #[test]
    fn test_batch_fixed_empty() {
        let batches: Vec<Vec<i32>> = batch_fixed(Vec::new(), 3);
        assert!(batches.is_empty());
    }

    #[test]
    fn test_batch_fixed_zero_size_is_one() {
        assert_eq!(batch_fixed(vec!['a', 'b'], 0), vec![vec!['a'], vec!['b']]);
    }

    #[test]
    fn test_batch_by_size_respects_budget() {
        let batches = batch_by_size(vec![3, 3, 3, 3], |n| *n, 6, None);
        assert_eq!(batches, vec![vec![3, 3], vec![3, 3]]);
    }

    #[test]
    fn test_batch_by_size_oversized_item_is_alone() {
        let batches = batch_by_size(vec![1, 50, 1, 1], |n| *n, 10, None);
        assert_eq!(batches, vec![vec![1], vec![50], vec![1, 1]]);
    }

    #[test]
    fn test_batch_by_size_oversized_first_item() {
        let batches = batch_by_size(vec![50, 1], |n| *n, 10, None);
        assert_eq!(batches, vec![vec![50], vec![1]]);
    }

    #[test]
    fn test_batch_by_size_item_cap() {
        let batches = batch_by_size(vec![1, 1, 1, 1, 1], |n| *n, 100, Some(2));
        assert_eq!(batches, vec![vec![1, 1], vec![1, 1], vec![1]]);
    }

    #[test]
    fn test_batch_by_size_zero_item_cap_means_unbounded() {
        let batches = batch_by_size(vec![1, 1, 1], |n| *n, 100, Some(0));
        assert_eq!(batches, vec![vec![1, 1, 1]]);
    }

    #[test]
    fn test_batch_by_size_empty() {
        let batches: Vec<Vec<usize>> = batch_by_size(Vec::new(), |n| *n, 10, None);
        assert!(batches.is_empty());
    }

    #[test]
    fn test_batch_by_size_preserves_order_and_bounds() {
        // Deterministic pseudo-random sizes
        let sizes: Vec<usize> = (0..200u64)
            .map(|i| ((i * 2654435761) % 97) as usize)
            .collect();
        let max_total = 120;

        let batches = batch_by_size(sizes.clone(), |n| *n, max_total, Some(7));

        let flattened: Vec<usize> = batches.iter().flatten().copied().collect();
        assert_eq!(flattened, sizes);

        for batch in &batches {
            assert!(!batch.is_empty());
            assert!(batch.len() <= 7);
            let total: usize = batch.iter().sum();
            assert!(total <= max_total || batch.len() == 1);
        }
    }

    #[test]
    fn test_batch_by_size_with_strings() {
        let texts = vec!["aaaa".to_string(), "bb".to_string(), "cccccc".to_string()];
        let batches = batch_by_size(texts, |s| s.len(), 6, None);
        assert_eq!(
            batches,
            vec![
                vec!["aaaa".to_string(), "bb".to_string()],
                vec!["cccccc".to_string()]
            ]
        );
    }
}
