//! InsightDash dashboard exporter
//!
//! Snapshots a list of live, chart-bearing dashboard pages and composes them
//! into a single multi-page PDF. Each page is rendered in its own headless
//! session, given time for asynchronous charts to draw, normalized so the
//! rasterizer can paint its styles, captured as a bitmap, and appended as a
//! titled page.
//!
//! # Features
//!
//! - **Static Backend** (default): pure Rust, fetches pages over HTTP and
//!   paints a block-level preview. No JavaScript.
//! - **CDP Backend** (`cdp`): drives headless Chrome via the DevTools Protocol
//! - **Sequential by default**: one rendering session exists at a time;
//!   bounded concurrency is an explicit opt-in
//!
//! # Example
//!
//! ```no_run
//! use dashexport::{ExportConfig, Exporter, FileDelivery};
//!
//! # #[cfg(feature = "static")]
//! # async fn run() -> dashexport::Result<()> {
//! let config = ExportConfig {
//!     base_url: "http://localhost:8000".to_string(),
//!     ..Default::default()
//! };
//!
//! let provider = dashexport::static_html::StaticProvider::new(&config)?;
//! let exporter = Exporter::new(provider, config.clone())?;
//! let mut sink = FileDelivery::new(".");
//! exporter.export(&config.pages, &mut sink).await?;
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub mod error;
pub use error::{Error, Result, StyleAccessError};

pub mod capture;
pub mod compose;
pub mod export;
pub mod session;
pub mod style;
pub mod wait;

// Request glue collaborators of the dashboard app
pub mod comments;
pub mod download;

#[cfg(feature = "cdp")]
pub mod cdp;

// Static backend: HTTP fetch + HTML parsing, no JS
#[cfg(feature = "static")]
pub mod static_html;

// Block painter used by the static backend
#[cfg(feature = "static")]
pub mod rendering;

pub use capture::PageCapture;
pub use compose::{ExportDocument, PageGeometry, Placement};
pub use export::{Delivery, Exporter, FileDelivery};
pub use session::{ChartContainer, RenderSession, SessionProvider, Surface};
pub use style::{NormalizedStyles, StyleNormalizer, StyleRule, StyleSheet, Theme, ThemeFallbackTable};
pub use wait::{await_condition, RenderWaiter, WaitOutcome};

/// File name the finished document is delivered under
pub const EXPORT_FILE_NAME: &str = "InsightDash_Dashboard.pdf";

/// Identifier of the details/annotation side panel
pub const DETAILS_PANEL_ID: &str = "details";

/// Class that marks the details panel as open
pub const DETAILS_OPEN_CLASS: &str = "open";

/// Identifiers of the chart containers a dashboard page may carry
pub const CHART_CONTAINER_IDS: [&str; 5] = [
    "line-chart",
    "bar-chart",
    "area-chart",
    "scatter-chart",
    "sankey-chart",
];

/// One dashboard page to export
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageSpec {
    /// Route of the page, resolved against `ExportConfig::base_url`
    pub path: String,
    /// Title written above the page's image
    pub title: String,
}

impl PageSpec {
    pub fn new(path: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
        }
    }
}

/// Configuration for an export run
///
/// The defaults reproduce the dashboard's own export button: four pages,
/// a 1280x720 surface, a 500ms chart poll bounded at 10 seconds, and an
/// unbounded page load wait.
///
/// # Examples
///
/// ```
/// let cfg = dashexport::ExportConfig::default();
/// assert_eq!(cfg.pages.len(), 4);
/// assert_eq!(cfg.file_name, "InsightDash_Dashboard.pdf");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Origin the page paths are resolved against
    pub base_url: String,
    /// Pages to export, in output order
    pub pages: Vec<PageSpec>,
    /// Size of each off-screen rendering surface
    pub viewport: Viewport,
    /// Interval between chart container checks, in milliseconds
    pub render_poll_interval_ms: u64,
    /// Upper bound on the chart wait, in milliseconds
    pub render_timeout_ms: u64,
    /// Optional bound on the page load wait. `None` waits indefinitely.
    pub load_timeout_ms: Option<u64>,
    /// Maximum number of pages captured at once (1 = strictly sequential)
    pub max_concurrent_captures: usize,
    /// File name of the delivered document
    pub file_name: String,
    /// User agent sent by HTTP-based backends
    pub user_agent: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            pages: default_pages(),
            viewport: Viewport::default(),
            render_poll_interval_ms: 500,
            render_timeout_ms: 10_000,
            load_timeout_ms: None,
            max_concurrent_captures: 1,
            file_name: EXPORT_FILE_NAME.to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) InsightDash-Export/0.1".to_string(),
        }
    }
}

impl ExportConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::ConfigError(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Check the configuration before any page is processed.
    pub fn validate(&self) -> Result<()> {
        if self.pages.is_empty() {
            return Err(Error::ConfigError("no pages to export".into()));
        }
        if self.max_concurrent_captures == 0 {
            return Err(Error::ConfigError("max_concurrent_captures must be at least 1".into()));
        }
        if self.render_poll_interval_ms == 0 {
            return Err(Error::ConfigError("render_poll_interval_ms must be positive".into()));
        }
        if self.render_poll_interval_ms > self.render_timeout_ms {
            return Err(Error::ConfigError(format!(
                "poll interval ({}ms) exceeds render timeout ({}ms)",
                self.render_poll_interval_ms, self.render_timeout_ms
            )));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::ConfigError("viewport must be non-empty".into()));
        }
        Ok(())
    }

    /// Absolute URL of a page route.
    pub fn page_url(&self, path: &str) -> String {
        page_url(&self.base_url, path)
    }

    pub fn render_poll_interval(&self) -> Duration {
        Duration::from_millis(self.render_poll_interval_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(Duration::from_millis)
    }
}

/// Resolve a page route against a base URL. Absolute URLs pass through.
pub fn page_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// The dashboard's four pages in menu order
pub fn default_pages() -> Vec<PageSpec> {
    vec![
        PageSpec::new("/", "Home Dashboard"),
        PageSpec::new("/productivity", "Productivity Dashboard"),
        PageSpec::new("/fte", "FTE Dashboard"),
        PageSpec::new("/sankey", "Sankey Dashboard"),
    ]
}

/// Viewport dimensions in logical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Options handed to a session's rasterizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOptions {
    /// Device pixels per logical pixel
    pub scale: f64,
    /// Whether images served from other origins may be painted
    pub allow_cross_origin: bool,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            allow_cross_origin: true,
        }
    }
}

/// A PNG-encoded bitmap and its pixel dimensions
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Bitmap {
    /// Wrap PNG bytes, reading the dimensions from the image header.
    pub fn from_png(png: Vec<u8>) -> Result<Self> {
        let (width, height) = image::ImageReader::with_format(
            std::io::Cursor::new(&png),
            image::ImageFormat::Png,
        )
        .into_dimensions()
        .map_err(|e| Error::SessionError(format!("Invalid PNG from rasterizer: {}", e)))?;
        Ok(Self { png, width, height })
    }
}

/// A rasterized page, produced once and consumed by the document
#[derive(Debug, Clone)]
pub struct CapturedPage {
    pub title: String,
    pub bitmap: Bitmap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExportConfig::default();
        assert_eq!(config.viewport.width, 1280);
        assert_eq!(config.viewport.height, 720);
        assert_eq!(config.render_poll_interval_ms, 500);
        assert_eq!(config.render_timeout_ms, 10_000);
        assert!(config.load_timeout_ms.is_none());
        assert_eq!(config.max_concurrent_captures, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn page_url_joins_routes() {
        let config = ExportConfig {
            base_url: "http://dash.local:8000/".into(),
            ..Default::default()
        };
        assert_eq!(config.page_url("/"), "http://dash.local:8000/");
        assert_eq!(config.page_url("/fte"), "http://dash.local:8000/fte");
        assert_eq!(config.page_url("sankey"), "http://dash.local:8000/sankey");
        assert_eq!(config.page_url("https://other/x"), "https://other/x");
    }

    #[test]
    fn config_from_partial_json() {
        let json = r#"{ "base_url": "http://example:9000", "pages": [ { "path": "/fte", "title": "FTE" } ], "load_timeout_ms": 30000 }"#;
        let config: ExportConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.base_url, "http://example:9000");
        assert_eq!(config.pages, vec![PageSpec::new("/fte", "FTE")]);
        assert_eq!(config.load_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.viewport, Viewport::default());
    }

    #[test]
    fn validate_rejects_bad_configs() {
        let empty = ExportConfig { pages: vec![], ..Default::default() };
        assert!(matches!(empty.validate(), Err(Error::ConfigError(_))));

        let zero = ExportConfig { max_concurrent_captures: 0, ..Default::default() };
        assert!(zero.validate().is_err());

        let slow_poll = ExportConfig {
            render_poll_interval_ms: 20_000,
            ..Default::default()
        };
        assert!(slow_poll.validate().is_err());
    }

    #[test]
    fn bitmap_reads_png_dimensions() {
        let img = image::RgbaImage::new(7, 3);
        let mut png = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let bitmap = Bitmap::from_png(png).unwrap();
        assert_eq!((bitmap.width, bitmap.height), (7, 3));
    }
}
