//! Property-based tests for remote alias derivation.
//!
//! These use proptest to check that derived aliases are stable, distinct and
//! always usable as a git remote name.

#[cfg(test)]
mod proptest_tests {
    use crate::remote::{derive_alias, sanitize};
    use proptest::prelude::*;

    proptest! {
        /// Property: the same URL always derives the same alias
        #[test]
        fn derive_alias_is_deterministic(url in ".*") {
            prop_assert_eq!(derive_alias(&url), derive_alias(&url));
        }

        /// Property: distinct URLs derive distinct aliases
        #[test]
        fn derive_alias_separates_distinct_urls(a in "[a-z]{1,8}://[a-z.]{1,20}/[a-z/]{1,30}", b in "[a-z]{1,8}://[a-z.]{1,20}/[a-z/]{1,30}") {
            prop_assume!(a != b);
            prop_assert_ne!(derive_alias(&a), derive_alias(&b));
        }

        /// Property: derived aliases only use ref-safe characters
        #[test]
        fn derive_alias_is_ref_safe(url in ".*") {
            let alias = derive_alias(&url);
            prop_assert!(alias.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
        }

        /// Property: sanitize never leaves characters git would reject
        #[test]
        fn sanitize_output_is_ref_safe(name in ".*") {
            let safe = sanitize(&name);
            prop_assert!(
                safe.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')),
                "sanitize produced unsafe output '{}' from '{}'",
                safe,
                name
            );
        }

        /// Property: sanitize is idempotent
        #[test]
        fn sanitize_is_idempotent(name in ".*") {
            let once = sanitize(&name);
            prop_assert_eq!(sanitize(&once), once);
        }
    }
}
