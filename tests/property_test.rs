//! Property checks for the quantified invariants.

use proptest::prelude::*;
use std::time::Duration;
use url::Url;

use gallery_scout::pagination::content_hash;
use gallery_scout::{ErrorCategory, RetryPolicy, UrlCanonicalizer};

fn retryable_categories() -> impl Strategy<Value = ErrorCategory> {
    prop_oneof![
        Just(ErrorCategory::Network),
        Just(ErrorCategory::Timeout),
        Just(ErrorCategory::Server),
        Just(ErrorCategory::RateLimit),
        Just(ErrorCategory::Cors),
        Just(ErrorCategory::Extension),
        Just(ErrorCategory::Default),
    ]
}

proptest! {
    #[test]
    fn retry_delay_always_within_bounds(
        category in retryable_categories(),
        attempt in 1u32..=12,
    ) {
        let policy = RetryPolicy::for_category(category);
        let delay = policy.delay_for_attempt(attempt);
        prop_assert!(delay >= Duration::from_millis(100));
        prop_assert!(delay <= policy.max_delay.max(Duration::from_millis(100)));
    }

    #[test]
    fn canonicalization_is_idempotent(
        host in "[a-z]{3,10}",
        segments in proptest::collection::vec("[a-z0-9]{1,8}", 0..4),
        page in proptest::option::of(1u32..500),
    ) {
        let mut raw = format!("https://{host}.example/{}", segments.join("/"));
        if let Some(page) = page {
            raw.push_str(&format!("?page={page}"));
        }
        let canonicalizer = UrlCanonicalizer::default();
        let base = Url::parse("https://base.example/").expect("valid base");

        let once = canonicalizer.canonicalize(&raw, &base);
        prop_assert!(once.is_some());
        if let Some(once) = once {
            let twice = canonicalizer.canonicalize(once.as_str(), &base);
            prop_assert_eq!(Some(once), twice);
        }
    }

    #[test]
    fn content_hash_ignores_whitespace_shape(
        words in proptest::collection::vec("[a-z]{1,8}", 1..20),
        extra_spaces in 1usize..5,
    ) {
        let tight = words.join(" ");
        let loose = words.join(&" ".repeat(extra_spaces));
        prop_assert_eq!(content_hash(&tight), content_hash(&loose));
    }

    #[test]
    fn bad_target_guard_never_passes_placeholders(suffix in "[a-z0-9]{0,6}") {
        let canonicalizer = UrlCanonicalizer::default();
        let js_target = format!("javascript:{}", suffix);
        prop_assert!(canonicalizer.is_bad_pagination_target("#"));
        prop_assert!(canonicalizer.is_bad_pagination_target(&js_target));
        prop_assert!(canonicalizer.is_bad_pagination_target("/null"));
    }
}
