use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::http_client::DEFAULT_USER_AGENT;
use crate::source::SourceError;

/// Subresource categories a surface may refuse to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    Stylesheet,
    Font,
    Media,
}

impl ResourceKind {
    pub const NON_ESSENTIAL: [Self; 4] = [Self::Image, Self::Stylesheet, Self::Font, Self::Media];
}

/// Anti-detection and loading options applied when a surface is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceOptions {
    pub user_agent: String,
    pub headers: BTreeMap<String, String>,
    pub blocked_resources: Vec<ResourceKind>,
    pub navigation_timeout: Duration,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        let headers = [
            (
                "accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
            ("accept-language", "en-US,en;q=0.9"),
            ("upgrade-insecure-requests", "1"),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .collect();

        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers,
            blocked_resources: ResourceKind::NON_ESSENTIAL.to_vec(),
            navigation_timeout: Duration::from_secs(20),
        }
    }
}

impl SurfaceOptions {
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn blocks(&self, kind: ResourceKind) -> bool {
        self.blocked_resources.contains(&kind)
    }
}

/// Document state captured after navigation settles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPage {
    pub url: String,
    pub title: String,
    /// Markup of the rendered document.
    pub html: String,
}

impl RenderedPage {
    pub fn new(url: impl Into<String>, title: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            html: html.into(),
        }
    }
}

pub type RenderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// One open page/tab of a rendering engine.
pub trait RenderSurface: Send {
    fn navigate<'a>(&'a mut self, url: &'a str) -> RenderFuture<'a, RenderedPage>;

    /// Releases the surface. Must be safe to call after a failed navigation.
    fn close(&mut self) -> RenderFuture<'_, ()>;
}

/// Rendering engine able to open configured surfaces.
pub trait RenderBackend: Send + Sync {
    fn open<'a>(&'a self, options: &'a SurfaceOptions) -> RenderFuture<'a, Box<dyn RenderSurface>>;
}
