//! Property tests for the aggregation engine.

use proptest::prelude::*;
use yield_monitor::core::{partition, round1};
use yield_monitor::{counts, trend, Record, TrendParams, YieldStatus};

fn records_from(outcomes: &[bool]) -> Vec<Record> {
    outcomes
        .iter()
        .enumerate()
        .map(|(i, &pass)| Record {
            id: i as i64,
            status: if pass {
                YieldStatus::Pass
            } else {
                YieldStatus::Fail
            },
            temp_c: Some(if pass { 200.0 } else { 209.0 }),
            pressure_psi: Some(30.0),
            timestamp: None,
        })
        .collect()
}

proptest! {
    #[test]
    fn bucket_count_is_ceil_of_len_over_window(
        outcomes in prop::collection::vec(any::<bool>(), 0..200),
        window_size in 1usize..40,
    ) {
        let records = records_from(&outcomes);
        let points = trend(&records, &TrendParams::with_window_size(window_size)).unwrap();

        prop_assert_eq!(points.len(), (outcomes.len() + window_size - 1) / window_size);
        prop_assert_eq!(points.iter().map(|p| p.samples).sum::<usize>(), outcomes.len());
    }

    #[test]
    fn windows_cover_input_in_order(
        outcomes in prop::collection::vec(any::<bool>(), 0..200),
        window_size in 1usize..40,
    ) {
        let records = records_from(&outcomes);
        let windows = partition(&records, window_size).unwrap();

        let mut expected_start = 0;
        for (i, window) in windows.iter().enumerate() {
            prop_assert_eq!(window.start, expected_start);
            if i + 1 < windows.len() {
                prop_assert_eq!(window.len(), window_size);
            } else {
                prop_assert!(window.len() >= 1 && window.len() <= window_size);
            }
            expected_start += window.len();
        }
    }

    #[test]
    fn window_yield_matches_pass_ratio(
        outcomes in prop::collection::vec(any::<bool>(), 1..200),
        window_size in 1usize..40,
    ) {
        let records = records_from(&outcomes);
        let points = trend(&records, &TrendParams::with_window_size(window_size)).unwrap();

        for (i, (point, chunk)) in points.iter().zip(outcomes.chunks(window_size)).enumerate() {
            let passes = chunk.iter().filter(|&&p| p).count();
            let expected = round1(100.0 * passes as f64 / chunk.len() as f64);

            prop_assert!((0.0..=100.0).contains(&point.yield_pct));
            prop_assert_eq!(point.yield_pct, expected);
            // Untimestamped records fall back to the ordinal label.
            prop_assert_eq!(&point.time_label, &format!("Pt {}", i * window_size));
        }
    }

    #[test]
    fn counts_partition_the_history(outcomes in prop::collection::vec(any::<bool>(), 0..300)) {
        let records = records_from(&outcomes);
        let tally = counts(&records);

        prop_assert_eq!(tally.total(), outcomes.len() as u64);
        prop_assert_eq!(tally.pass, outcomes.iter().filter(|&&p| p).count() as u64);
    }

    #[test]
    fn recent_limit_only_sees_the_tail(
        outcomes in prop::collection::vec(any::<bool>(), 1..200),
        window_size in 1usize..20,
        recent in 1usize..100,
    ) {
        let records = records_from(&outcomes);
        let params = TrendParams {
            recent_limit: Some(recent),
            ..TrendParams::with_window_size(window_size)
        };
        let points = trend(&records, &params).unwrap();

        let tail = recent.min(outcomes.len());
        let expected = trend(
            &records[outcomes.len() - tail..],
            &TrendParams::with_window_size(window_size),
        )
        .unwrap();
        prop_assert_eq!(points.len(), expected.len());
        for (a, b) in points.iter().zip(&expected) {
            prop_assert_eq!(a.yield_pct, b.yield_pct);
            prop_assert_eq!(a.samples, b.samples);
        }
    }
}

