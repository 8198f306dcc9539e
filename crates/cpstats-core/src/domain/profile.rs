use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Rank as reported by a platform: a numeric position or a named tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rank {
    Position(u64),
    Label(String),
}

impl Display for Rank {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Position(position) => write!(f, "#{position}"),
            Self::Label(label) => f.write_str(label),
        }
    }
}

/// Canonical statistics record returned for every platform.
///
/// Base fields are always serialized. Platform detail is flattened into the
/// same JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedProfile {
    pub platform: Platform,
    pub username: String,
    pub rating: u64,
    pub total_solved: u64,
    pub rank: Option<Rank>,
    #[serde(flatten)]
    pub stats: PlatformStats,
}

/// Platform-specific extension, one variant per platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PlatformStats {
    LeetCode(LeetCodeStats),
    Codeforces(CodeforcesStats),
    GitHub(GitHubStats),
    CodeChef(CodeChefStats),
    AtCoder(AtCoderStats),
}

impl PlatformStats {
    pub const fn platform(&self) -> Platform {
        match self {
            Self::LeetCode(_) => Platform::LeetCode,
            Self::Codeforces(_) => Platform::Codeforces,
            Self::GitHub(_) => Platform::GitHub,
            Self::CodeChef(_) => Platform::CodeChef,
            Self::AtCoder(_) => Platform::AtCoder,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeetCodeStats {
    pub easy_solved: u64,
    pub medium_solved: u64,
    pub hard_solved: u64,
    pub reputation: u64,
    pub contest_rating: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeforcesStats {
    pub max_rating: u64,
    pub max_rank: Option<String>,
    pub contribution: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubStats {
    pub public_repos: u64,
    pub public_gists: u64,
    pub followers: u64,
    pub following: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeChefStats {
    pub max_rating: u64,
    /// Star tier such as `"4★"`.
    pub stars: Option<String>,
    pub global_rank: Option<u64>,
    pub country_rank: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AtCoderStats {
    pub max_rating: u64,
    pub rated_matches: u64,
}
