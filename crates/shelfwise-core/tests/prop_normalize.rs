use proptest::prelude::*;
use shelfwise_core::{is_auth_endpoint, normalize_email, paths};

proptest! {
    #[test]
    fn normalize_email_is_idempotent(email in "[ -~\\t]{0,40}") {
        let once = normalize_email(&email);
        prop_assert_eq!(normalize_email(&once), once);
    }

    #[test]
    fn normalize_email_strips_surrounding_whitespace(
        local in "[A-Za-z0-9._]{1,16}",
        domain in "[A-Za-z0-9]{1,16}\\.[A-Za-z]{2,6}",
        pad_left in "[ \\t]{0,4}",
        pad_right in "[ \\t\\n]{0,4}",
    ) {
        let raw = format!("{pad_left}{local}@{domain}{pad_right}");
        let expected = format!("{local}@{domain}").to_lowercase();
        prop_assert_eq!(normalize_email(&raw), expected);
    }

    #[test]
    fn resource_paths_are_never_auth_endpoints(segment in "[a-z]{1,12}", id in 0u32..10_000) {
        prop_assume!(!["token", "logout", "users"].contains(&segment.as_str()));
        let path = format!("/api/{segment}/{id}/");
        prop_assert!(!is_auth_endpoint(&path));
    }

    #[test]
    fn token_subpaths_are_auth_endpoints(suffix in "[a-z]{0,12}/?") {
        let path = format!("{}{suffix}", paths::TOKEN);
        prop_assert!(is_auth_endpoint(&path));
    }
}
