//! Pipeline metrics.

use metrics::{counter, histogram};
use reel_models::{Credits, FeatureKey};

/// Metric name constants for consistency.
pub mod names {
    pub const CREDITS_DEDUCTED_TOTAL: &str = "reel_credits_deducted_total";
    pub const CREDITS_REFUNDED_TOTAL: &str = "reel_credits_refunded_total";
    pub const INSUFFICIENT_CREDITS_TOTAL: &str = "reel_insufficient_credits_total";
    pub const REFUND_FAILURES_TOTAL: &str = "reel_refund_failures_total";

    pub const ADAPTER_CALLS_TOTAL: &str = "reel_adapter_calls_total";
    pub const ADAPTER_DURATION_SECONDS: &str = "reel_adapter_duration_seconds";

    pub const SCENES_GENERATED_TOTAL: &str = "reel_scene_media_generated_total";
}

/// Credits are counted in hundredths so the counter stays integral.
pub fn record_deduction(feature: FeatureKey, amount: Credits) {
    counter!(names::CREDITS_DEDUCTED_TOTAL, "feature" => feature.as_str())
        .increment(amount.hundredths());
}

pub fn record_refund(feature: FeatureKey, amount: Credits) {
    counter!(names::CREDITS_REFUNDED_TOTAL, "feature" => feature.as_str())
        .increment(amount.hundredths());
}

pub fn record_insufficient(feature: FeatureKey) {
    counter!(names::INSUFFICIENT_CREDITS_TOTAL, "feature" => feature.as_str()).increment(1);
}

pub fn record_refund_failure(feature: FeatureKey) {
    counter!(names::REFUND_FAILURES_TOTAL, "feature" => feature.as_str()).increment(1);
}

/// Record one provider call. `outcome` is `success` or an error kind.
pub fn record_adapter_call(provider: &str, operation: &str, outcome: &str, duration_secs: f64) {
    let labels = [
        ("provider", provider.to_string()),
        ("operation", operation.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::ADAPTER_CALLS_TOTAL, &labels).increment(1);
    histogram!(names::ADAPTER_DURATION_SECONDS, &labels[..2]).record(duration_secs);
}

/// Record a per-scene media result (`image` or `video`).
pub fn record_scene_media(media: &str, success: bool) {
    counter!(
        names::SCENES_GENERATED_TOTAL,
        "media" => media.to_string(),
        "result" => if success { "success" } else { "failure" }
    )
    .increment(1);
}
