use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::surface::{RenderBackend, RenderSurface, RenderedPage, SurfaceOptions};
use crate::source::SourceError;

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPoolConfig {
    /// Hard cap on concurrently open surfaces.
    pub max_instances: usize,
    /// How long a caller may wait for a slot before `PoolExhausted`.
    pub acquire_timeout: Duration,
}

impl Default for RenderPoolConfig {
    fn default() -> Self {
        Self {
            max_instances: 3,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Bounded pool of rendering surfaces.
///
/// A slot is held for exactly one [`RenderPool::render`] call. The slot and
/// the surface are both released on every exit path: the slot is a scoped
/// permit and the surface is closed explicitly, or by [`SurfaceGuard`] when
/// the future is dropped mid-flight.
#[derive(Clone)]
pub struct RenderPool {
    backend: Arc<dyn RenderBackend>,
    slots: Arc<Semaphore>,
    config: RenderPoolConfig,
    options: SurfaceOptions,
}

impl std::fmt::Debug for RenderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPool")
            .field("config", &self.config)
            .field("in_use", &self.in_use())
            .finish_non_exhaustive()
    }
}

impl RenderPool {
    pub fn new(
        backend: Arc<dyn RenderBackend>,
        config: RenderPoolConfig,
        options: SurfaceOptions,
    ) -> Self {
        let config = RenderPoolConfig {
            max_instances: config.max_instances.max(1),
            ..config
        };
        Self {
            backend,
            slots: Arc::new(Semaphore::new(config.max_instances)),
            config,
            options,
        }
    }

    pub const fn config(&self) -> RenderPoolConfig {
        self.config
    }

    pub fn options(&self) -> &SurfaceOptions {
        &self.options
    }

    pub fn in_use(&self) -> usize {
        self.config
            .max_instances
            .saturating_sub(self.slots.available_permits())
    }

    /// Opens a surface, navigates to `url` and returns the settled page.
    pub async fn render(&self, url: &str) -> Result<RenderedPage, SourceError> {
        let _slot = match tokio::time::timeout(
            self.config.acquire_timeout,
            Arc::clone(&self.slots).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(SourceError::pool_exhausted("render pool is closed")),
            Err(_) => {
                warn!(
                    max_instances = self.config.max_instances,
                    "render pool exhausted"
                );
                return Err(SourceError::pool_exhausted(format!(
                    "no render slot free within {}ms ({} instances busy)",
                    self.config.acquire_timeout.as_millis(),
                    self.config.max_instances
                )));
            }
        };

        let mut guard = SurfaceGuard::default();
        let surface = guard.hold(self.backend.open(&self.options).await?);

        let navigation =
            tokio::time::timeout(self.options.navigation_timeout, surface.navigate(url)).await;
        guard.close().await;

        let page = navigation.map_err(|_| {
            SourceError::timeout(format!(
                "navigation to {url} exceeded {}ms",
                self.options.navigation_timeout.as_millis()
            ))
        })??;
        debug!(url, title = %page.title, "page rendered");
        Ok(page)
    }
}

/// Closes the held surface even if the owning future is dropped.
#[derive(Default)]
struct SurfaceGuard {
    surface: Option<Box<dyn RenderSurface>>,
}

impl SurfaceGuard {
    fn hold(&mut self, surface: Box<dyn RenderSurface>) -> &mut Box<dyn RenderSurface> {
        self.surface.insert(surface)
    }

    async fn close(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            if let Err(error) = surface.close().await {
                warn!(error = %error, "failed to close render surface");
            }
        }
    }
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        let Some(mut surface) = self.surface.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) = surface.close().await {
                        warn!(error = %error, "failed to close abandoned render surface");
                    }
                });
            }
            Err(_) => warn!("render surface dropped outside a runtime; not closed"),
        }
    }
}
