//! Raw-to-canonical normalization.
//!
//! Base fields are resolved through fallback chains shared by every platform:
//!
//! | Field | Chain | Default |
//! |-------|-------|---------|
//! | `rating` | `rating` | `0` |
//! | `totalSolved` | `totalSolved`, `problemsSolved` | `0` |
//! | `rank` | `rank`, `globalRank` | `null` |
//!
//! Each platform then appends its extension with the same rule: a missing
//! optional field takes its default and never produces an error.

use serde_json::Value;

use crate::domain::{
    AtCoderStats, CodeChefStats, CodeforcesStats, GitHubStats, LeetCodeStats, NormalizedProfile,
    PlatformStats, Rank, RawSourceRecord,
};
use crate::platform::Platform;
use crate::ValidationError;

const TOTAL_SOLVED_CHAIN: &[&str] = &["totalSolved", "problemsSolved"];
const RANK_CHAIN: &[&str] = &["rank", "globalRank"];

/// Validated normalization input for one platform.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    platform: Platform,
    username: &'a str,
    data: &'a RawSourceRecord,
}

impl<'a> Normalizer<'a> {
    /// Fails with [`ValidationError::InvalidInput`] unless a username and a
    /// successful record are both present.
    pub fn new(
        platform: Platform,
        username: &'a str,
        data: Option<&'a RawSourceRecord>,
    ) -> Result<Self, ValidationError> {
        if username.trim().is_empty() {
            return Err(ValidationError::InvalidInput {
                reason: String::from("username is required"),
            });
        }

        let data = data.ok_or_else(|| ValidationError::InvalidInput {
            reason: String::from("raw source data is required"),
        })?;

        if !data.is_success() {
            return Err(ValidationError::InvalidInput {
                reason: format!(
                    "raw source data reports failure: {}",
                    data.diagnostic.as_deref().unwrap_or("no diagnostic")
                ),
            });
        }

        Ok(Self {
            platform,
            username: username.trim(),
            data,
        })
    }

    pub fn normalize(&self) -> NormalizedProfile {
        let data = self.data;
        NormalizedProfile {
            platform: self.platform,
            username: self.username.to_owned(),
            rating: data.u64_field("rating").unwrap_or(0),
            total_solved: data.first_u64(TOTAL_SOLVED_CHAIN).unwrap_or(0),
            rank: data.first_value(RANK_CHAIN).and_then(rank_from_value),
            stats: self.platform_stats(),
        }
    }

    fn platform_stats(&self) -> PlatformStats {
        let data = self.data;
        match self.platform {
            Platform::LeetCode => PlatformStats::LeetCode(LeetCodeStats {
                easy_solved: data.first_u64(&["easySolved", "easy"]).unwrap_or(0),
                medium_solved: data.first_u64(&["mediumSolved", "medium"]).unwrap_or(0),
                hard_solved: data.first_u64(&["hardSolved", "hard"]).unwrap_or(0),
                reputation: data.u64_field("reputation").unwrap_or(0),
                contest_rating: data
                    .first_u64(&["contestRating", "rating"])
                    .unwrap_or(0),
            }),
            Platform::Codeforces => PlatformStats::Codeforces(CodeforcesStats {
                max_rating: data.u64_field("maxRating").unwrap_or(0),
                max_rank: data.str_field("maxRank"),
                contribution: data
                    .get("contribution")
                    .and_then(Value::as_i64)
                    .unwrap_or(0),
            }),
            Platform::GitHub => PlatformStats::GitHub(GitHubStats {
                public_repos: data.first_u64(&["publicRepos", "public_repos"]).unwrap_or(0),
                public_gists: data.first_u64(&["publicGists", "public_gists"]).unwrap_or(0),
                followers: data.u64_field("followers").unwrap_or(0),
                following: data.u64_field("following").unwrap_or(0),
            }),
            Platform::CodeChef => PlatformStats::CodeChef(CodeChefStats {
                max_rating: data.first_u64(&["maxRating", "highestRating"]).unwrap_or(0),
                stars: data.str_field("stars"),
                global_rank: data.u64_field("globalRank"),
                country_rank: data.u64_field("countryRank"),
            }),
            Platform::AtCoder => PlatformStats::AtCoder(AtCoderStats {
                max_rating: data.first_u64(&["maxRating", "highestRating"]).unwrap_or(0),
                rated_matches: data.u64_field("ratedMatches").unwrap_or(0),
            }),
        }
    }
}

/// Pure entry point dispatching on `platform`.
pub fn normalize(
    platform: Platform,
    username: &str,
    data: &RawSourceRecord,
) -> Result<NormalizedProfile, ValidationError> {
    Normalizer::new(platform, username, Some(data)).map(|normalizer| normalizer.normalize())
}

fn rank_from_value(value: &Value) -> Option<Rank> {
    match value {
        Value::Number(number) => number.as_u64().map(Rank::Position),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                None
            } else if let Ok(position) = text.trim_start_matches('#').parse::<u64>() {
                Some(Rank::Position(position))
            } else {
                Some(Rank::Label(text.to_owned()))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_missing_username_or_data() {
        let record = RawSourceRecord::success();

        for platform in Platform::ALL {
            let err = Normalizer::new(platform, "", Some(&record)).expect_err("must fail");
            assert!(matches!(err, ValidationError::InvalidInput { .. }));

            let err = Normalizer::new(platform, "someone", None).expect_err("must fail");
            assert!(matches!(err, ValidationError::InvalidInput { .. }));
        }
    }

    #[test]
    fn rejects_failed_records() {
        let record = RawSourceRecord::failed("upstream said no");
        let err = normalize(Platform::AtCoder, "someone", &record).expect_err("must fail");
        let ValidationError::InvalidInput { reason } = err else {
            panic!("expected invalid input");
        };
        assert!(reason.contains("upstream said no"));
    }

    #[test]
    fn empty_records_yield_documented_defaults_for_every_platform() {
        let record = RawSourceRecord::success();

        for platform in Platform::ALL {
            let profile = normalize(platform, "someone", &record).expect("must normalize");
            assert_eq!(profile.platform, platform);
            assert_eq!(profile.rating, 0);
            assert_eq!(profile.total_solved, 0);
            assert_eq!(profile.rank, None);
            assert_eq!(profile.stats.platform(), platform);

            let value = serde_json::to_value(&profile).expect("serializes");
            let object = value.as_object().expect("profile is an object");
            for key in ["platform", "username", "rating", "totalSolved", "rank"] {
                assert!(object.contains_key(key), "{platform}: missing {key}");
            }
            assert_eq!(object["rank"], Value::Null);
        }
    }

    #[test]
    fn codeforces_record_normalizes_to_canonical_shape() {
        let record = RawSourceRecord::from_json(json!({
            "rating": 3979,
            "maxRating": 4009,
            "rank": "legendary grandmaster"
        }));

        let profile = normalize(Platform::Codeforces, "tourist", &record).expect("normalizes");
        let value = serde_json::to_value(&profile).expect("serializes");

        assert_eq!(value["platform"], json!("codeforces"));
        assert_eq!(value["username"], json!("tourist"));
        assert_eq!(value["rating"], json!(3979));
        assert_eq!(value["totalSolved"], json!(0));
        assert_eq!(value["rank"], json!("legendary grandmaster"));
        assert_eq!(value["maxRating"], json!(4009));
    }

    #[test]
    fn fallback_chains_pick_secondary_fields() {
        let record = RawSourceRecord::from_json(json!({
            "problemsSolved": 812,
            "globalRank": 1523,
            "highestRating": 2150,
            "stars": "5★"
        }));

        let profile = normalize(Platform::CodeChef, "gennady", &record).expect("normalizes");
        assert_eq!(profile.total_solved, 812);
        assert_eq!(profile.rank, Some(Rank::Position(1523)));

        let PlatformStats::CodeChef(stats) = profile.stats else {
            panic!("expected codechef stats");
        };
        assert_eq!(stats.max_rating, 2150);
        assert_eq!(stats.stars.as_deref(), Some("5★"));
        assert_eq!(stats.country_rank, None);
    }

    #[test]
    fn primary_field_wins_over_fallback() {
        let record = RawSourceRecord::from_json(json!({
            "totalSolved": 10,
            "problemsSolved": 99,
            "rank": 7,
            "globalRank": 1000
        }));

        let profile = normalize(Platform::LeetCode, "alice", &record).expect("normalizes");
        assert_eq!(profile.total_solved, 10);
        assert_eq!(profile.rank, Some(Rank::Position(7)));
    }
}
