/// Confidence score for one source's tick: static per-source trust rank
/// adjusted by observed transport latency, clamped to [10, 100].
///
/// Pure and deterministic; no hidden state.
pub fn score(trust_rank: u8, latency_ms: u64) -> u8 {
    let base: i16 = match trust_rank {
        0 => 95,
        1 => 90,
        2 => 80,
        _ => 70,
    };

    let adjustment: i16 = if latency_ms < 100 {
        5
    } else if latency_ms > 1_000 {
        -10
    } else if latency_ms >= 500 {
        -5
    } else {
        0
    };

    (base + adjustment).clamp(10, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn base_scores_by_trust_rank() {
        // Latency in the neutral band isolates the base score.
        assert_eq!(score(0, 200), 95);
        assert_eq!(score(1, 200), 90);
        assert_eq!(score(2, 200), 80);
        assert_eq!(score(3, 200), 70);
        assert_eq!(score(255, 200), 70);
    }

    #[test]
    fn latency_adjustments() {
        assert_eq!(score(1, 50), 95); // < 100ms: +5
        assert_eq!(score(1, 99), 95);
        assert_eq!(score(1, 100), 90); // neutral band
        assert_eq!(score(1, 499), 90);
        assert_eq!(score(1, 500), 85); // 500-1000ms: -5
        assert_eq!(score(1, 1_000), 85);
        assert_eq!(score(1, 1_001), 80); // > 1000ms: -10
    }

    #[test]
    fn top_rank_with_fast_link_caps_at_100() {
        assert_eq!(score(0, 10), 100);
    }

    proptest! {
        #[test]
        fn always_within_bounds(rank in any::<u8>(), latency in any::<u64>()) {
            let s = score(rank, latency);
            prop_assert!((10..=100).contains(&s));
        }

        #[test]
        fn lower_rank_never_scores_lower(latency in 0u64..5_000) {
            // Trust dominates: rank 0 >= rank 1 >= rank 2 at equal latency.
            prop_assert!(score(0, latency) >= score(1, latency));
            prop_assert!(score(1, latency) >= score(2, latency));
            prop_assert!(score(2, latency) >= score(3, latency));
        }
    }
}
