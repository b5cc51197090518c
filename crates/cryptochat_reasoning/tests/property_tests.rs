//! Property-based tests for the reply-side parsers.
//!
//! Score parsing and operator input parsing face arbitrary text, so they must
//! never panic and must stay inside their documented ranges.

use cryptochat_reasoning::console::{parse_selection, parse_yes_no};
use cryptochat_reasoning::similarity::parse_score;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    /// Any parsed score is clamped to [0, 1].
    #[test]
    fn score_in_unit_range(s in "\\PC{0,200}") {
        if let Some(score) = parse_score(&s) {
            prop_assert!((0.0..=1.0).contains(&score), "score {} from {:?}", score, s);
        }
    }

    /// A decimal literal anywhere in the reply is found.
    #[test]
    fn score_found_in_noise(prefix in "[a-zA-Z ]{0,20}", value in 0.0f32..1.0, suffix in "[a-zA-Z ]{0,20}") {
        let text = format!("{}{:.2}{}", prefix, value, suffix);
        let parsed = parse_score(&text);
        prop_assert!(parsed.is_some(), "no score in {:?}", text);
        prop_assert!((parsed.unwrap() - value).abs() < 0.01);
    }

    /// Selections only ever contain distinct in-range indices.
    #[test]
    fn selection_indices_valid(s in "[0-9, ]{0,30}", len in 1usize..10) {
        if let Some(picked) = parse_selection(&s, len) {
            prop_assert!(picked.len() >= 2);
            prop_assert!(picked.iter().all(|&i| i < len));
            let mut sorted = picked.clone();
            sorted.sort_unstable();
            sorted.dedup();
            prop_assert_eq!(sorted.len(), picked.len());
        }
    }

    /// Yes/no parsing never panics on arbitrary input.
    #[test]
    fn yes_no_total(s in "\\PC{0,50}") {
        let _ = parse_yes_no(&s);
    }
}
