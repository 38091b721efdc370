//! Subscription tier policy for watermarking.
//!
//! The rule fails closed: a user with no profile row, no tier value, or
//! an unrecognized trial tier gets watermarked output. Only a known paid
//! tier skips the watermark.

/// Tiers that receive watermarked video output.
const FREE_TIERS: &[&str] = &["free", "trial"];

/// Whether a generation owned by a user with this subscription tier
/// must be watermarked. `None` (no profile row or NULL column) is free.
pub fn is_free_tier(subscription_tier: Option<&str>) -> bool {
    match subscription_tier {
        None => true,
        Some(tier) => {
            let tier = tier.trim().to_lowercase();
            tier.is_empty() || FREE_TIERS.contains(&tier.as_str())
        }
    }
}

/// Human-readable tier label recorded in processing metadata.
///
/// Prefers the tier column, falls back to the status column, then "free".
pub fn tier_label(subscription_tier: Option<&str>, subscription_status: Option<&str>) -> String {
    subscription_tier
        .or(subscription_status)
        .unwrap_or("free")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_profile_is_free() {
        assert!(is_free_tier(None));
    }

    #[test]
    fn free_and_trial_are_free() {
        assert!(is_free_tier(Some("free")));
        assert!(is_free_tier(Some("trial")));
        assert!(is_free_tier(Some("FREE")));
        assert!(is_free_tier(Some(" Trial ")));
    }

    #[test]
    fn empty_tier_is_free() {
        assert!(is_free_tier(Some("")));
        assert!(is_free_tier(Some("   ")));
    }

    #[test]
    fn paid_tiers_are_not_free() {
        assert!(!is_free_tier(Some("pro")));
        assert!(!is_free_tier(Some("studio")));
    }

    #[test]
    fn tier_label_prefers_tier_column() {
        assert_eq!(tier_label(Some("pro"), Some("active")), "pro");
        assert_eq!(tier_label(None, Some("active")), "active");
        assert_eq!(tier_label(None, None), "free");
    }
}
