//! Deterministic counter-mode pseudo-random generation.
//!
//! Every draw is the SHA-256 digest of `seed || "," || domain || "," ||
//! counter`, interpreted big-endian. The counter starts at 1 and increments
//! monotonically within a domain, so the whole stream is a pure function of
//! `(seed, domain, counter sequence)` and runs reproduce byte-identically
//! on any platform.

use sha2::{Digest, Sha256};

/// One pseudo-random stream, scoped to a context label (`domain`).
#[derive(Debug, Clone)]
pub struct Prng {
    prefix: String,
    counter: u64,
}

impl Prng {
    pub fn new(seed: &str, domain: &str) -> Prng {
        Prng::with_counter_base(seed, domain, 0)
    }

    /// Start the counter at `base` instead of 0.
    ///
    /// Parallel consumers of one domain carve the counter space into
    /// disjoint ranges (one per Monte-Carlo trial) so the draws a trial
    /// consumes do not depend on scheduling.
    pub fn with_counter_base(seed: &str, domain: &str, base: u64) -> Prng {
        Prng {
            prefix: format!("{},{},", seed, domain),
            counter: base,
        }
    }

    fn next_digest(&mut self) -> [u8; 32] {
        self.counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.prefix.as_bytes());
        hasher.update(self.counter.to_string().as_bytes());
        hasher.finalize().into()
    }

    /// Uniform integer in the inclusive range `[lo, hi]`.
    ///
    /// Rejection sampling on the top bits of the digest: a draw outside the
    /// range is discarded and the counter advances, which leaves no modulo
    /// bias.
    pub fn uniform_int(&mut self, lo: u64, hi: u64) -> u64 {
        debug_assert!(lo <= hi);
        let span = hi - lo + 1;
        if span == 1 {
            return lo;
        }
        let bits = 64 - (span - 1).leading_zeros();
        loop {
            let digest = self.next_digest();
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&digest[..8]);
            let value = u64::from_be_bytes(raw) >> (64 - bits);
            if value < span {
                return lo + value;
            }
        }
    }

    /// Uniform float in the open interval (0, 1), from the top 53 bits of
    /// the digest.
    pub fn uniform_f64(&mut self) -> f64 {
        let digest = self.next_digest();
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        let mantissa = u64::from_be_bytes(raw) >> 11;
        (mantissa as f64 + 0.5) / (1u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn streams_are_deterministic() {
        let mut a = Prng::new("13456201235197891138", "J");
        let mut b = Prng::new("13456201235197891138", "J");
        for _ in 0..64 {
            assert_eq!(a.uniform_int(0, 9999), b.uniform_int(0, 9999));
        }
    }

    #[test]
    fn domains_are_independent() {
        let mut a = Prng::new("13456201235197891138", "J");
        let mut b = Prng::new("13456201235197891138", "K");
        let draws_a: Vec<u64> = (0..16).map(|_| a.uniform_int(0, u64::MAX - 1)).collect();
        let draws_b: Vec<u64> = (0..16).map(|_| b.uniform_int(0, u64::MAX - 1)).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn counter_base_offsets_the_stream() {
        let mut head = Prng::new("12345678901234567890", "risk:C:001");
        let first = head.uniform_f64();
        let mut offset = Prng::with_counter_base("12345678901234567890", "risk:C:001", 1);
        let second_via_offset = offset.uniform_f64();
        let second = head.uniform_f64();
        assert_eq!(second, second_via_offset);
        assert_ne!(first, second);
    }

    proptest! {
        #[test]
        fn uniform_int_stays_in_range(
            lo in 0u64..1000,
            width in 0u64..1000,
            salt in 0u64..100
        ) {
            let mut prng = Prng::new("98765432109876543210", &format!("d{}", salt));
            for _ in 0..8 {
                let v = prng.uniform_int(lo, lo + width);
                prop_assert!(v >= lo && v <= lo + width);
            }
        }

        #[test]
        fn uniform_f64_is_an_open_unit_draw(salt in 0u64..200) {
            let mut prng = Prng::new("98765432109876543210", &format!("f{}", salt));
            let v = prng.uniform_f64();
            prop_assert!(v > 0.0 && v < 1.0);
        }
    }
}
