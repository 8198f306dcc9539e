use std::time::{Duration, Instant};

/// Longest horizon a configured duration is allowed to push a deadline out.
pub(crate) const MAX_HORIZON: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + after`, clamped to [`MAX_HORIZON`] so oversized configuration
/// cannot overflow the monotonic clock.
pub(crate) fn deadline(now: Instant, after: Duration) -> Instant {
    let after = after.min(MAX_HORIZON);
    now.checked_add(after).unwrap_or(now)
}
