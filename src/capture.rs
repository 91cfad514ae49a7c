//! Single page capture
//!
//! One call walks a page through its whole lifecycle:
//! created -> loading -> normalizing -> waiting for render -> rasterizing,
//! with the surface destroyed on the way out whatever happened.

use crate::session::{RenderSession, SessionProvider, Surface};
use crate::style::StyleNormalizer;
use crate::wait::RenderWaiter;
use crate::{CapturedPage, Error, ExportConfig, PageSpec, RasterOptions, Result, Viewport};
use log::{debug, info};
use std::time::Duration;

/// Captures pages through sessions from a provider
pub struct PageCapture<'a, P: SessionProvider> {
    provider: &'a P,
    base_url: String,
    viewport: Viewport,
    load_timeout: Option<Duration>,
    normalizer: StyleNormalizer,
    waiter: RenderWaiter,
    raster: RasterOptions,
}

impl<'a, P: SessionProvider> PageCapture<'a, P> {
    pub fn new(provider: &'a P, config: &ExportConfig) -> Self {
        Self {
            provider,
            base_url: config.base_url.clone(),
            viewport: config.viewport,
            load_timeout: config.load_timeout(),
            normalizer: StyleNormalizer::default(),
            waiter: RenderWaiter::new(config.render_poll_interval(), config.render_timeout()),
            raster: RasterOptions::default(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: StyleNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Render `spec` in a fresh surface and rasterize it.
    pub async fn capture(&self, spec: &PageSpec) -> Result<CapturedPage> {
        let path = spec.path.as_str();
        let mut surface = Surface::acquire(self.provider, self.viewport, path)
            .await
            .map_err(|e| Error::capture(path, e))?;

        let url = crate::page_url(&self.base_url, path);
        debug!("[{}] loading {}", path, url);
        match self.load_timeout {
            None => surface.load(&url).await,
            Some(limit) => match tokio::time::timeout(limit, surface.load(&url)).await {
                Ok(res) => res,
                Err(_) => Err(Error::SessionError(format!(
                    "load did not finish within {}ms",
                    limit.as_millis()
                ))),
            },
        }
        .map_err(|e| Error::load(path, e))?;

        debug!("[{}] normalizing", path);
        surface.hide_details_panel().await.map_err(|e| Error::capture(path, e))?;
        let sheets = surface.style_sheets().await.map_err(|e| Error::capture(path, e))?;
        let body_class = surface.theme_class().await.map_err(|e| Error::capture(path, e))?;
        let overrides = self.normalizer.normalize(&sheets, body_class.as_deref());
        if !overrides.is_empty() {
            surface
                .apply_style_overrides(&overrides)
                .await
                .map_err(|e| Error::capture(path, e))?;
        }

        debug!("[{}] waiting for charts", path);
        let outcome = self.waiter.wait(&mut *surface).await;
        // Chart scripts may have reopened the panel while we waited
        surface.hide_details_panel().await.map_err(|e| Error::capture(path, e))?;

        debug!("[{}] rasterizing", path);
        let bitmap = surface
            .rasterize(&self.raster)
            .await
            .map_err(|e| Error::capture(path, e))?;

        info!(
            "Captured {} ({}x{}, charts {} after {}ms)",
            path,
            bitmap.width,
            bitmap.height,
            if outcome.is_satisfied() { "ready" } else { "incomplete" },
            outcome.elapsed().as_millis()
        );
        Ok(CapturedPage {
            title: spec.title.clone(),
            bitmap,
        })
    }
}
