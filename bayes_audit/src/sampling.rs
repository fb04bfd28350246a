//! Deterministic sampling orders.
//!
//! Each collection's paper ballots are shuffled once, by a Fisher-Yates
//! pass fed from the seeded counter-mode generator in the collection's own
//! domain. The permutation depends only on the audit seed, the collection
//! id, and the manifest order, so every party can recompute it.

use crate::model::AuditSeed;
use crate::prng::Prng;

/// Permutation of manifest indices `0..n` for collection `pbcid`.
///
/// Position `i` of the result is the manifest index drawn at sampling-order
/// position `i + 1`.
pub fn sampling_order(seed: &AuditSeed, pbcid: &str, n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    let mut prng = Prng::new(seed.as_str(), pbcid);
    for i in (1..n).rev() {
        let j = prng.uniform_int(0, i as u64) as usize;
        order.swap(i, j);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn seed() -> AuditSeed {
        AuditSeed::parse("13456201235197891138").unwrap()
    }

    #[test]
    fn order_is_reproducible() {
        assert_eq!(sampling_order(&seed(), "J", 1000), sampling_order(&seed(), "J", 1000));
    }

    #[test]
    fn collections_get_distinct_orders() {
        assert_ne!(sampling_order(&seed(), "J", 100), sampling_order(&seed(), "K", 100));
    }

    #[test]
    fn empty_and_singleton_manifests() {
        assert!(sampling_order(&seed(), "J", 0).is_empty());
        assert_eq!(sampling_order(&seed(), "J", 1), vec![0]);
    }

    proptest! {
        #[test]
        fn order_is_a_permutation(n in 0usize..300) {
            let order = sampling_order(&seed(), "J", n);
            prop_assert_eq!(order.len(), n);
            let seen: BTreeSet<usize> = order.iter().cloned().collect();
            prop_assert_eq!(seen.len(), n);
            prop_assert!(order.iter().all(|&i| i < n));
        }
    }
}
