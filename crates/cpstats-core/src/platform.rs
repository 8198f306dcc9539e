//! Platform identifiers and profile reference detection.
//!
//! Detection is domain-substring based and runs in a fixed priority order.
//! Some domains can appear inside another platform's URL (for example a
//! GitHub link embedded in a LeetCode profile query string), so the order of
//! [`DETECTION_ORDER`] is part of the contract.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Supported competitive-programming platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    LeetCode,
    Codeforces,
    GitHub,
    CodeChef,
    AtCoder,
}

impl Platform {
    pub const ALL: [Self; 5] = [
        Self::LeetCode,
        Self::Codeforces,
        Self::GitHub,
        Self::CodeChef,
        Self::AtCoder,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LeetCode => "leetcode",
            Self::Codeforces => "codeforces",
            Self::GitHub => "github",
            Self::CodeChef => "codechef",
            Self::AtCoder => "atcoder",
        }
    }

    /// Domain substring used to recognise a profile URL.
    pub const fn domain(self) -> &'static str {
        match self {
            Self::LeetCode => "leetcode.com",
            Self::Codeforces => "codeforces.com",
            Self::GitHub => "github.com",
            Self::CodeChef => "codechef.com",
            Self::AtCoder => "atcoder.jp",
        }
    }

    /// Markers that precede the username, tried in order.
    const fn username_markers(self) -> &'static [&'static str] {
        match self {
            Self::LeetCode => &["leetcode.com/u/", "leetcode.com/"],
            Self::Codeforces => &["profile/"],
            Self::GitHub => &["github.com/"],
            Self::CodeChef | Self::AtCoder => &["users/"],
        }
    }

    /// Canonical public profile URL for a username.
    pub fn profile_url(self, username: &str) -> String {
        let username = urlencoding::encode(username);
        match self {
            Self::LeetCode => format!("https://leetcode.com/u/{username}/"),
            Self::Codeforces => format!("https://codeforces.com/profile/{username}"),
            Self::GitHub => format!("https://github.com/{username}"),
            Self::CodeChef => format!("https://www.codechef.com/users/{username}"),
            Self::AtCoder => format!("https://atcoder.jp/users/{username}"),
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "leetcode" => Ok(Self::LeetCode),
            "codeforces" => Ok(Self::Codeforces),
            "github" => Ok(Self::GitHub),
            "codechef" => Ok(Self::CodeChef),
            "atcoder" => Ok(Self::AtCoder),
            other => Err(ValidationError::InvalidPlatform {
                value: other.to_owned(),
            }),
        }
    }
}

/// Priority order used by [`detect`].
pub const DETECTION_ORDER: [Platform; 5] = [
    Platform::LeetCode,
    Platform::Codeforces,
    Platform::GitHub,
    Platform::CodeChef,
    Platform::AtCoder,
];

/// Immutable `(platform, username)` pair identifying one profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProfileReference {
    platform: Platform,
    username: String,
}

impl ProfileReference {
    pub fn new(platform: Platform, username: impl Into<String>) -> Result<Self, ValidationError> {
        let username = username.into();
        let trimmed = username.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidReference {
                reference: username,
                reason: "username must not be empty",
            });
        }
        if trimmed.contains('/') || trimmed.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidReference {
                reference: username,
                reason: "username must be a single path segment",
            });
        }

        Ok(Self {
            platform,
            username: trimmed.to_owned(),
        })
    }

    /// Parses either a profile URL or a `platform:username` pair.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        if let Some((platform, username)) = input.split_once(':') {
            if !username.starts_with("//") {
                if let Ok(platform) = platform.parse::<Platform>() {
                    return Self::new(platform, username);
                }
            }
        }
        detect(input)
    }

    pub const fn platform(&self) -> Platform {
        self.platform
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Cache key in `platform:username` form. Usernames are case-insensitive
    /// on every supported platform, so the key is lowercased.
    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}",
            self.platform.as_str(),
            self.username.to_ascii_lowercase()
        )
    }

    pub fn profile_url(&self) -> String {
        self.platform.profile_url(&self.username)
    }
}

impl Display for ProfileReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.platform, self.username)
    }
}

/// Maps a raw profile reference to `(platform, username)`.
///
/// The first platform in [`DETECTION_ORDER`] whose domain occurs in the input
/// wins. The username is the segment right after the platform marker,
/// truncated at the next `/`, `?` or `#`.
pub fn detect(reference: &str) -> Result<ProfileReference, ValidationError> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidReference {
            reference: reference.to_owned(),
            reason: "reference must be a non-empty string",
        });
    }

    let lowered = trimmed.to_ascii_lowercase();
    let platform = DETECTION_ORDER
        .into_iter()
        .find(|platform| lowered.contains(platform.domain()))
        .ok_or_else(|| ValidationError::UnsupportedPlatform {
            reference: trimmed.to_owned(),
        })?;

    let marker_end = platform
        .username_markers()
        .iter()
        .find_map(|marker| lowered.find(marker).map(|index| index + marker.len()))
        .ok_or_else(|| ValidationError::InvalidReference {
            reference: trimmed.to_owned(),
            reason: "profile marker not found",
        })?;

    // Markers are ASCII, so byte offsets line up between `lowered` and `trimmed`.
    let rest = &trimmed[marker_end..];
    let username = rest
        .split(|ch| matches!(ch, '/' | '?' | '#'))
        .next()
        .unwrap_or_default();

    if username.is_empty() {
        return Err(ValidationError::InvalidReference {
            reference: trimmed.to_owned(),
            reason: "no username follows the profile marker",
        });
    }

    ProfileReference::new(platform, username)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_each_supported_platform() {
        let cases = [
            ("https://leetcode.com/u/neal_wu/", Platform::LeetCode, "neal_wu"),
            ("https://leetcode.com/lee215", Platform::LeetCode, "lee215"),
            ("https://codeforces.com/profile/tourist", Platform::Codeforces, "tourist"),
            ("https://github.com/torvalds", Platform::GitHub, "torvalds"),
            ("https://www.codechef.com/users/gennady", Platform::CodeChef, "gennady"),
            ("https://atcoder.jp/users/tourist/history", Platform::AtCoder, "tourist"),
        ];

        for (input, platform, username) in cases {
            let reference = detect(input).expect("reference should be detected");
            assert_eq!(reference.platform(), platform, "input={input}");
            assert_eq!(reference.username(), username, "input={input}");
        }
    }

    #[test]
    fn truncates_username_at_first_separator() {
        let reference =
            detect("https://codeforces.com/profile/Petr/extra?tab=1").expect("must detect");
        assert_eq!(reference.username(), "Petr");

        let reference = detect("https://github.com/octocat?tab=repositories").expect("must detect");
        assert_eq!(reference.username(), "octocat");
    }

    #[test]
    fn priority_order_prefers_leetcode_over_embedded_github() {
        let reference = detect("https://leetcode.com/u/alice/?ref=github.com/alice")
            .expect("must detect");
        assert_eq!(reference.platform(), Platform::LeetCode);
        assert_eq!(reference.username(), "alice");
    }

    #[test]
    fn rejects_unknown_domains() {
        let err = detect("https://topcoder.com/members/someone").expect_err("must fail");
        assert!(matches!(err, ValidationError::UnsupportedPlatform { .. }));
    }

    #[test]
    fn rejects_marker_without_username() {
        let err = detect("https://codeforces.com/profile/").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidReference { .. }));

        let err = detect("https://atcoder.jp/contests/abc300").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidReference { .. }));
    }

    #[test]
    fn rejects_blank_input() {
        let err = detect("   ").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidReference { .. }));
    }

    #[test]
    fn parses_platform_username_pairs() {
        let reference = ProfileReference::parse("codechef:gennady").expect("must parse");
        assert_eq!(reference.platform(), Platform::CodeChef);
        assert_eq!(reference.username(), "gennady");

        let reference = ProfileReference::parse("https://github.com/octocat").expect("must parse");
        assert_eq!(reference.platform(), Platform::GitHub);
    }

    #[test]
    fn cache_key_is_case_insensitive() {
        let upper = ProfileReference::new(Platform::Codeforces, "Tourist").expect("valid");
        let lower = ProfileReference::new(Platform::Codeforces, "tourist").expect("valid");
        assert_eq!(upper.cache_key(), lower.cache_key());
        assert_eq!(upper.cache_key(), "codeforces:tourist");
    }
}
