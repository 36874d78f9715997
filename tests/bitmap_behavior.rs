use std::collections::BTreeSet;

use proptest::prelude::*;

use netindex::bitmap::Bitmap;
use netindex::MAX_VALID_PORT;

proptest! {
    #[test]
    fn membership_tracks_set_calls(indices in prop::collection::btree_set(0usize..MAX_VALID_PORT, 0..64)) {
        let mut bitmap = Bitmap::new(MAX_VALID_PORT);
        for &idx in &indices {
            bitmap.set(idx);
        }

        for idx in 0..MAX_VALID_PORT {
            prop_assert_eq!(bitmap.check(idx), indices.contains(&idx));
        }
    }

    #[test]
    fn indexes_in_range_is_the_exact_complement(
        indices in prop::collection::btree_set(0usize..2048, 0..64),
        lo in 0usize..2048,
        span in 0usize..512,
    ) {
        let mut bitmap = Bitmap::new(2048);
        for &idx in &indices {
            bitmap.set(idx);
        }

        let hi = (lo + span).min(2047);
        let free: BTreeSet<usize> = bitmap.indexes_in_range(false, lo, hi).into_iter().collect();
        let expected: BTreeSet<usize> = (lo..=hi).filter(|idx| !indices.contains(idx)).collect();
        prop_assert_eq!(free, expected);
    }

    #[test]
    fn clear_all_restores_the_empty_bitmap(indices in prop::collection::vec(0usize..MAX_VALID_PORT, 0..64)) {
        let mut bitmap = Bitmap::new(MAX_VALID_PORT);
        for &idx in &indices {
            bitmap.set(idx);
        }

        bitmap.clear_all();
        prop_assert_eq!(bitmap, Bitmap::new(MAX_VALID_PORT));
    }
}
