//! Rendering session traits and the scoped surface guard
//!
//! A session is one isolated, off-screen rendering surface. Backends hand
//! them out through a `SessionProvider`; the pipeline only ever holds one
//! through a `Surface`, which closes it on every exit path (including early
//! returns and dropped futures).

#![allow(async_fn_in_trait)]

use crate::style::{NormalizedStyles, StyleSheet};
use crate::{Bitmap, RasterOptions, Result, Viewport};
use log::{debug, warn};
use serde::Deserialize;
use std::ops::{Deref, DerefMut};

/// State of one chart container in a loaded page
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChartContainer {
    /// Element identifier, e.g. `line-chart`
    pub id: String,
    /// Whether the element exists in the page at all
    pub present: bool,
    /// Whether the element has any content yet
    pub populated: bool,
}

/// Core trait for isolated rendering surfaces
pub trait RenderSession {
    /// Load a URL and suspend until the page reports it finished loading.
    /// A page that never finishes keeps this pending.
    async fn load(&mut self, url: &str) -> Result<()>;

    /// Force the details/annotation panel into its hidden, closed state.
    /// Pages without the panel succeed without doing anything.
    async fn hide_details_panel(&mut self) -> Result<()>;

    /// Class attribute of the page body, if any
    async fn theme_class(&mut self) -> Result<Option<String>>;

    /// Snapshot of the page's style sheets, readable or not
    async fn style_sheets(&mut self) -> Result<Vec<StyleSheet>>;

    /// Apply normalized style values to this session's page only.
    /// Applying the same overrides again must leave the page unchanged.
    async fn apply_style_overrides(&mut self, overrides: &NormalizedStyles) -> Result<()>;

    /// Report the state of each requested chart container
    async fn chart_containers(&mut self, ids: &[&str]) -> Result<Vec<ChartContainer>>;

    /// Rasterize the visible body of the page
    async fn rasterize(&mut self, options: &RasterOptions) -> Result<Bitmap>;

    /// Release the surface. Must tolerate being called more than once.
    fn close(&mut self) -> Result<()>;
}

/// Source of fresh rendering sessions
pub trait SessionProvider {
    type Session: RenderSession;

    /// Check that the backend can produce sessions at all.
    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    /// Acquire a fresh session with the given surface size
    async fn open(&self, viewport: Viewport) -> Result<Self::Session>;
}

/// Scoped ownership of a rendering session
///
/// The session is closed when the surface is dropped, so callers can use `?`
/// freely between acquisition and rasterization.
pub struct Surface<S: RenderSession> {
    session: S,
    label: String,
}

impl<S: RenderSession> Surface<S> {
    /// Acquire a session from `provider`, labelled for logging.
    pub async fn acquire<P>(provider: &P, viewport: Viewport, label: &str) -> Result<Self>
    where
        P: SessionProvider<Session = S>,
    {
        let session = provider.open(viewport).await?;
        debug!(
            "[{}] surface created ({}x{})",
            label, viewport.width, viewport.height
        );
        Ok(Self {
            session,
            label: label.to_string(),
        })
    }
}

impl<S: RenderSession> Deref for Surface<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: RenderSession> DerefMut for Surface<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: RenderSession> Drop for Surface<S> {
    fn drop(&mut self) {
        match self.session.close() {
            Ok(()) => debug!("[{}] surface destroyed", self.label),
            Err(e) => warn!("[{}] failed to destroy surface: {}", self.label, e),
        }
    }
}
