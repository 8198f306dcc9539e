//! # Browser rendering
//!
//! Support for sources that expose no API.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`RenderBackend`] / [`RenderSurface`] | Engine seam: open a configured page, navigate, close |
//! | [`HttpRenderBackend`] | Static-document backend over [`crate::http_client::HttpClient`] |
//! | [`RenderPool`] | Hard cap on open surfaces; `PoolExhausted` when no slot frees in time |
//! | [`inspect_page`] | Block and not-found detection before extraction |
//! | [`extract_fields`] | Per-field [`Extractor`] fallback chains |

mod extract;
mod http_backend;
mod pool;
mod surface;

pub use extract::{
    extract_fields, first_number, normalize_ws, slice_between_ci, strip_tags, visible_text,
    Extractor, FieldKind, FieldSpec, PageText,
};
pub use http_backend::HttpRenderBackend;
pub use pool::{RenderPool, RenderPoolConfig};
pub use surface::{
    RenderBackend, RenderFuture, RenderSurface, RenderedPage, ResourceKind, SurfaceOptions,
};

use crate::source::SourceError;

const BLOCKED_TITLE_MARKERS: &[&str] = &[
    "forbidden",
    "access denied",
    "just a moment",
    "attention required",
];
const NOT_FOUND_TITLE_MARKERS: &[&str] = &["not found"];
const NOT_FOUND_CONTENT_MARKERS: &[&str] = &[
    "broken link",
    "page not found",
    "user not found",
    "user does not exist",
];

/// Fails with `Blocked` or `NotFound` when the page is a block or error page.
///
/// Status codes only count at the start of the title, and the profile handle
/// (last path segment of the URL) is removed before matching.
pub fn inspect_page(page: &RenderedPage) -> Result<(), SourceError> {
    let title = title_without_handle(page);
    if starts_with_status(&title, "403")
        || BLOCKED_TITLE_MARKERS.iter().any(|marker| title.contains(marker))
    {
        return Err(SourceError::blocked(format!(
            "{} served a block page: '{}'",
            page.url, page.title
        )));
    }

    if starts_with_status(&title, "404")
        || NOT_FOUND_TITLE_MARKERS.iter().any(|marker| title.contains(marker))
    {
        return Err(SourceError::not_found(format!(
            "{} reports not found: '{}'",
            page.url, page.title
        )));
    }

    let text = visible_text(&page.html).to_ascii_lowercase();
    if let Some(marker) = NOT_FOUND_CONTENT_MARKERS
        .iter()
        .find(|marker| text.contains(*marker))
    {
        return Err(SourceError::not_found(format!(
            "{} page contains '{marker}'",
            page.url
        )));
    }

    Ok(())
}

fn title_without_handle(page: &RenderedPage) -> String {
    let title = page.title.to_ascii_lowercase();
    let handle = page
        .url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.trim_end_matches('/').rsplit('/').next())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if handle.is_empty() || handle.contains('.') {
        return title;
    }
    title.replace(&handle, " ")
}

/// `403 ...`, `Error 403`, `403: Forbidden`; not `4031` or `403abc`.
fn starts_with_status(title: &str, code: &str) -> bool {
    let title = title.trim_start();
    let title = title.strip_prefix("error").map_or(title, str::trim_start);
    title
        .strip_prefix(code)
        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceErrorKind;

    fn page(title: &str, html: &str) -> RenderedPage {
        RenderedPage::new("https://atcoder.jp/users/tourist", title, html)
    }

    #[test]
    fn block_titles_are_detected() {
        for title in ["403 Forbidden", "Access Denied", "Just a moment..."] {
            let error = inspect_page(&page(title, "")).expect_err("blocked");
            assert_eq!(error.kind(), SourceErrorKind::Blocked, "{title}");
        }
    }

    #[test]
    fn not_found_markers_are_detected() {
        let error = inspect_page(&page("404 Not Found", "")).expect_err("title marker");
        assert_eq!(error.kind(), SourceErrorKind::NotFound);

        let error = inspect_page(&page(
            "CodeChef",
            "<body><h1>Oops! Broken Link</h1></body>",
        ))
        .expect_err("content marker");
        assert_eq!(error.kind(), SourceErrorKind::NotFound);
    }

    #[test]
    fn handles_containing_status_codes_are_not_misread() {
        let table = "<table><tr><th>Rating</th><td>1500</td></tr></table>";
        let atcoder = RenderedPage::new("https://atcoder.jp/users/neo403", "neo403 - AtCoder", table);
        let codechef = RenderedPage::new(
            "https://www.codechef.com/users/coder404",
            "coder404 | CodeChef User Profile",
            table,
        );

        assert!(inspect_page(&atcoder).is_ok());
        assert!(inspect_page(&codechef).is_ok());
    }

    #[test]
    fn handles_that_are_bare_status_codes_are_not_misread() {
        let page = RenderedPage::new("https://atcoder.jp/users/403", "403 - AtCoder", "<div>Rating 1200</div>");

        assert!(inspect_page(&page).is_ok());
    }

    #[test]
    fn status_titles_still_match_after_the_handle_is_removed() {
        let page = RenderedPage::new(
            "https://www.codechef.com/users/ghost",
            "404 | CodeChef",
            "",
        );

        let error = inspect_page(&page).expect_err("status title");
        assert_eq!(error.kind(), SourceErrorKind::NotFound);
    }

    #[test]
    fn markers_inside_scripts_are_ignored() {
        let html = "<script>if (missing) show('page not found')</script><div>Rating 2000</div>";

        assert!(inspect_page(&page("tourist - AtCoder", html)).is_ok());
    }
}
