//! Deterministic traffic bucketing.
//!
//! # Design Decisions
//! - XXH3-64 with the default seed: no per-process randomness, so a given
//!   identity lands in the same bucket on every machine and every restart
//! - 1000 buckets gives 0.1% split granularity
//! - A rate of zero means "gate not configured" and always passes

use xxhash_rust::xxh3::xxh3_64;

/// Number of traffic buckets.
pub const BUCKETS: u64 = 1000;

/// 64-bit hash of an identity.
pub fn stable_hash(identity: &str) -> u64 {
    xxh3_64(identity.as_bytes())
}

/// Bucket in `[0, BUCKETS)` for an identity.
pub fn bucket(identity: &str) -> u64 {
    stable_hash(identity) % BUCKETS
}

/// Number of buckets admitted by `rate`: `floor(rate * 1000)`.
pub fn threshold(rate: f64) -> u64 {
    (rate * BUCKETS as f64).floor() as u64
}

/// Returns true if the identity passes a rate gate.
pub fn within_rate(identity: &str, rate: f64) -> bool {
    if rate <= 0.0 {
        return true;
    }
    bucket(identity) < threshold(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        for id in ["101", "user-42", "", "中文"] {
            assert_eq!(stable_hash(id), stable_hash(id));
            assert!(bucket(id) < BUCKETS);
        }
    }

    #[test]
    fn test_known_vector() {
        // XXH3-64 of the empty input with seed 0.
        assert_eq!(stable_hash(""), 0x2D06_8005_38D3_94C2);
    }

    #[test]
    fn test_threshold() {
        assert_eq!(threshold(0.0), 0);
        assert_eq!(threshold(0.5), 500);
        assert_eq!(threshold(0.3), 300);
        assert_eq!(threshold(1.0), 1000);
    }

    #[test]
    fn test_rate_bounds() {
        for i in 0..500 {
            let id = i.to_string();
            assert!(within_rate(&id, 0.0), "zero rate is unconfigured");
            assert!(within_rate(&id, 1.0), "full rate admits everyone");
            assert_eq!(within_rate(&id, 0.5), bucket(&id) < 500);
        }
    }
}
