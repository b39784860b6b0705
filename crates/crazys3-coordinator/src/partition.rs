//! Assignment of work items to workers.

/// Index of the worker that receives the item with `sequence_id`.
///
/// `workers` must be non-zero; the coordinator refuses to start without
/// workers.
pub fn partition(sequence_id: u64, workers: usize) -> usize {
    (sequence_id % workers as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_round_robin_from_one() {
        let assigned: Vec<usize> = (1..=8).map(|seq| partition(seq, 4)).collect();
        assert_eq!(assigned, vec![1, 2, 3, 0, 1, 2, 3, 0]);
    }

    #[test]
    fn test_single_worker_gets_everything() {
        assert!((1..100).all(|seq| partition(seq, 1) == 0));
    }

    proptest! {
        #[test]
        fn prop_partition_in_range(seq in any::<u64>(), workers in 1usize..64) {
            prop_assert!(partition(seq, workers) < workers);
        }

        #[test]
        fn prop_loads_differ_by_at_most_one(n in 0u64..2000, workers in 1usize..16) {
            let mut loads = vec![0u64; workers];
            for seq in 1..=n {
                loads[partition(seq, workers)] += 1;
            }
            let max = *loads.iter().max().unwrap();
            let min = *loads.iter().min().unwrap();
            prop_assert!(max - min <= 1);
            prop_assert_eq!(loads.iter().sum::<u64>(), n);
        }
    }
}
