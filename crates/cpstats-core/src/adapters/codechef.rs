use super::scrape_profile;
use crate::platform::Platform;
use crate::render::{Extractor, FieldSpec, RenderPool};
use crate::source::{AdapterFuture, AdapterStrategy, SourceAdapter};

const RATING: &[Extractor] = &[
    Extractor::Marker {
        open: "<div class=\"rating-number\"",
        close: "</div>",
    },
    Extractor::Marker {
        open: "<div class=\"rating\"",
        close: "</div>",
    },
    Extractor::Label { label: "Rating" },
];

const HIGHEST_RATING: &[Extractor] = &[
    Extractor::Label {
        label: "Highest Rating",
    },
    Extractor::TableRow {
        label: "Highest Rating",
    },
];

const STARS: &[Extractor] = &[
    Extractor::Marker {
        open: "<span class=\"rating\"",
        close: "</span>",
    },
    Extractor::Marker {
        open: "<div class=\"rating-star\"",
        close: "</div>",
    },
];

const GLOBAL_RANK: &[Extractor] = &[
    Extractor::Marker {
        open: "<a href=\"/ratings/all\"",
        close: "</a>",
    },
    Extractor::Label {
        label: "Global Rank",
    },
];

const COUNTRY_RANK: &[Extractor] = &[
    Extractor::Marker {
        open: "<a href=\"/ratings/all?filterBy=Country",
        close: "</a>",
    },
    Extractor::Label {
        label: "Country Rank",
    },
];

const PROBLEMS_SOLVED: &[Extractor] = &[
    Extractor::Label {
        label: "Total Problems Solved",
    },
    Extractor::Label {
        label: "Fully Solved",
    },
    Extractor::TableRow {
        label: "Problems Solved",
    },
];

const FIELDS: &[FieldSpec] = &[
    FieldSpec::number("rating", RATING),
    FieldSpec::number("maxRating", HIGHEST_RATING),
    FieldSpec::text("stars", STARS),
    FieldSpec::optional_number("globalRank", GLOBAL_RANK),
    FieldSpec::optional_number("countryRank", COUNTRY_RANK),
    FieldSpec::number("problemsSolved", PROBLEMS_SOLVED),
];

/// CodeChef profile-page adapter (no public API).
#[derive(Debug, Clone)]
pub struct CodeChefAdapter {
    render_pool: RenderPool,
}

impl CodeChefAdapter {
    pub fn new(render_pool: RenderPool) -> Self {
        Self { render_pool }
    }
}

impl SourceAdapter for CodeChefAdapter {
    fn platform(&self) -> Platform {
        Platform::CodeChef
    }

    fn strategy(&self) -> AdapterStrategy {
        AdapterStrategy::Browser
    }

    fn fetch<'a>(&'a self, username: &'a str) -> AdapterFuture<'a> {
        Box::pin(async move {
            let url = Platform::CodeChef.profile_url(username);
            scrape_profile(&self.render_pool, &url, FIELDS).await
        })
    }
}
