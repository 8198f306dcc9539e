//! # Domain Models
//!
//! Canonical types shared by adapters, the normalizer and the pipeline.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RawSourceRecord`] | Opaque field map produced by a source adapter |
//! | [`NormalizedProfile`] | Canonical output record with guaranteed base fields |
//! | [`PlatformStats`] | Per-platform extension flattened into the profile |
//! | [`Rank`] | Integer position or named tier |
//!
//! ## Defaults
//!
//! Base fields never go missing: numeric counters default to `0` and `rank`
//! defaults to `null`.

mod profile;
mod raw;

pub use profile::{
    AtCoderStats, CodeChefStats, CodeforcesStats, GitHubStats, LeetCodeStats, NormalizedProfile,
    PlatformStats, Rank,
};
pub use raw::{RawSourceRecord, RecordStatus};
