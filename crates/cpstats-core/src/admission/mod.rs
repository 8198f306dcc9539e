//! # Caller admission
//!
//! Governors evaluated before a lookup enters the pipeline proper.
//!
//! | Governor | Keyed by | Rejects with |
//! |----------|----------|--------------|
//! | [`AdaptiveRateLimiter`] | caller ip | [`RateLimitRejection`] |
//! | [`BandwidthLedger`] | caller ip and global | [`BandwidthRejection`] |
//!
//! Rejections are never retried internally; they carry usage, limit and a
//! retry-after hint for the caller.

mod bandwidth;
mod rate_limiter;

pub use bandwidth::{BandwidthConfig, BandwidthLedger, BandwidthRejection, BandwidthScope};
pub use rate_limiter::{
    AdaptiveRateLimiter, RateLimitConfig, RateLimitDecision, RateLimitRejection,
};
