//! Splitting rows into bounded insert batches.

use std::collections::BTreeMap;

/// Rows per insert batch unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 2048;

/// Split `items` into consecutive chunks of at most `size` (minimum 1).
pub fn chunked<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut current = Vec::with_capacity(size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == size {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Split keyed groups into batches holding at most `size` items in total.
///
/// Keys are visited in order and each group keeps its item order. A group
/// larger than the remaining room is split across consecutive batches.
pub fn split_keyed<K, T>(groups: BTreeMap<K, Vec<T>>, size: usize) -> Vec<BTreeMap<K, Vec<T>>>
where
    K: Ord + Clone,
{
    let size = size.max(1);
    let mut batches = Vec::new();
    let mut current: BTreeMap<K, Vec<T>> = BTreeMap::new();
    let mut room = size;

    for (key, items) in groups {
        for item in items {
            current.entry(key.clone()).or_default().push(item);
            room -= 1;
            if room == 0 {
                batches.push(std::mem::take(&mut current));
                room = size;
            }
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn chunked_exact_and_remainder() {
        assert_eq!(chunked(vec![1, 2, 3, 4], 2), vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(chunked(vec![1, 2, 3], 2), vec![vec![1, 2], vec![3]]);
        assert!(chunked(Vec::<u8>::new(), 2).is_empty());
        assert_eq!(chunked(vec![1, 2], 0), vec![vec![1], vec![2]]);
    }

    #[test]
    fn split_keyed_spreads_large_group() {
        let mut groups = BTreeMap::new();
        let _ = groups.insert(1, vec!['a', 'b', 'c']);
        let _ = groups.insert(2, vec!['d']);
        let batches = split_keyed(groups, 2);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0][&1], vec!['a', 'b']);
        assert_eq!(batches[1][&1], vec!['c']);
        assert_eq!(batches[1][&2], vec!['d']);
    }

    proptest! {
        #[test]
        fn chunked_preserves_items(items in prop::collection::vec(any::<u16>(), 0..200), size in 1usize..50) {
            let batches = chunked(items.clone(), size);
            prop_assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= size));
            let flat: Vec<u16> = batches.into_iter().flatten().collect();
            prop_assert_eq!(flat, items);
        }

        #[test]
        fn split_keyed_bounds_and_preserves(
            groups in prop::collection::btree_map(0u8..20, prop::collection::vec(any::<u32>(), 0..40), 0..10),
            size in 1usize..64,
        ) {
            let total: usize = groups.values().map(Vec::len).sum();
            let batches = split_keyed(groups.clone(), size);

            for batch in &batches {
                let len: usize = batch.values().map(Vec::len).sum();
                prop_assert!(len >= 1 && len <= size);
            }
            prop_assert_eq!(batches.iter().flat_map(|b| b.values().map(Vec::len)).sum::<usize>(), total);

            // Concatenating batches in order restores every group.
            let mut rebuilt: BTreeMap<u8, Vec<u32>> = BTreeMap::new();
            for batch in batches {
                for (key, items) in batch {
                    rebuilt.entry(key).or_default().extend(items);
                }
            }
            let expected: BTreeMap<u8, Vec<u32>> =
                groups.into_iter().filter(|(_, items)| !items.is_empty()).collect();
            prop_assert_eq!(rebuilt, expected);
        }
    }
}
