use std::sync::Arc;

use super::extract::{slice_between_ci, strip_tags};
use super::surface::{RenderBackend, RenderFuture, RenderSurface, RenderedPage, SurfaceOptions};
use crate::http_client::{HttpClient, HttpRequest};
use crate::source::SourceError;

/// Render backend that loads the document over plain HTTP.
///
/// Only the document itself is requested, so every subresource category is
/// effectively blocked. Pages that need script execution need a headless
/// engine plugged in through [`RenderBackend`] instead.
#[derive(Clone)]
pub struct HttpRenderBackend {
    http_client: Arc<dyn HttpClient>,
}

impl HttpRenderBackend {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

impl RenderBackend for HttpRenderBackend {
    fn open<'a>(&'a self, options: &'a SurfaceOptions) -> RenderFuture<'a, Box<dyn RenderSurface>> {
        Box::pin(async move {
            Ok(Box::new(HttpSurface {
                http_client: Arc::clone(&self.http_client),
                options: options.clone(),
            }) as Box<dyn RenderSurface>)
        })
    }
}

struct HttpSurface {
    http_client: Arc<dyn HttpClient>,
    options: SurfaceOptions,
}

impl RenderSurface for HttpSurface {
    fn navigate<'a>(&'a mut self, url: &'a str) -> RenderFuture<'a, RenderedPage> {
        Box::pin(async move {
            let request = HttpRequest::get(url)
                .with_headers(
                    self.options
                        .headers
                        .iter()
                        .map(|(name, value)| (name.as_str(), value.as_str())),
                )
                .with_header("user-agent", self.options.user_agent.as_str())
                .with_timeout(self.options.navigation_timeout);

            let response = self
                .http_client
                .execute(request)
                .await
                .map_err(|error| error.into_source_error(url))?;

            // Block pages are recognised from their content, so 403 bodies are
            // returned to the caller rather than failed here.
            if !response.is_success() && response.status != 403 {
                return Err(SourceError::from_status(
                    response.status,
                    format!("{url} returned status {}", response.status),
                ));
            }

            let title = slice_between_ci(&response.body, "<title", "</title>")
                .map(strip_tags)
                .unwrap_or_default();
            let title = if title.is_empty() && response.status == 403 {
                String::from("403 Forbidden")
            } else {
                title
            };

            Ok(RenderedPage::new(url, title, response.body))
        })
    }

    fn close(&mut self) -> RenderFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}
