//! In-memory rendering backend for pipeline tests

#![allow(dead_code)]

use dashexport::{
    Bitmap, ChartContainer, Delivery, Error, NormalizedStyles, RasterOptions, RenderSession,
    Result, SessionProvider, StyleSheet, Viewport,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const BASE_URL: &str = "http://dash.test";

/// How one page behaves inside a fake session
#[derive(Debug, Clone)]
pub struct PageBehavior {
    pub fail_load: bool,
    /// Load never completes
    pub hang_load: bool,
    /// Charts populate this long after load; `None` means never
    pub charts_ready_after: Option<Duration>,
    pub charts_present: Vec<&'static str>,
    /// Chart scripts reopen the details panel on every poll
    pub reopen_details: bool,
    pub fail_rasterize: bool,
    pub body_class: Option<String>,
    pub sheets: Vec<StyleSheet>,
}

impl Default for PageBehavior {
    fn default() -> Self {
        Self {
            fail_load: false,
            hang_load: false,
            charts_ready_after: Some(Duration::ZERO),
            charts_present: vec!["line-chart", "bar-chart"],
            reopen_details: false,
            fail_rasterize: false,
            body_class: None,
            sheets: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FakeProvider {
    pages: Arc<HashMap<String, PageBehavior>>,
    events: Arc<Mutex<Vec<String>>>,
    counters: Arc<Counters>,
    fail_probe: bool,
}

impl FakeProvider {
    pub fn new(pages: impl IntoIterator<Item = (&'static str, PageBehavior)>) -> Self {
        Self {
            pages: Arc::new(pages.into_iter().map(|(p, b)| (p.to_string(), b)).collect()),
            ..Default::default()
        }
    }

    /// A provider whose renderer is unavailable
    pub fn without_renderer() -> Self {
        Self {
            fail_probe: true,
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }
}

impl SessionProvider for FakeProvider {
    type Session = FakeSession;

    async fn probe(&self) -> Result<()> {
        if self.fail_probe {
            return Err(Error::DependencyMissing("fake renderer unavailable".into()));
        }
        Ok(())
    }

    async fn open(&self, viewport: Viewport) -> Result<FakeSession> {
        let c = &self.counters;
        c.opened.fetch_add(1, Ordering::SeqCst);
        let live = c.live.fetch_add(1, Ordering::SeqCst) + 1;
        c.max_live.fetch_max(live, Ordering::SeqCst);
        self.events.lock().unwrap().push("open".into());
        Ok(FakeSession {
            provider: self.clone(),
            viewport,
            path: None,
            behavior: PageBehavior::default(),
            loaded_at: None,
            details_open: false,
            overrides: NormalizedStyles::default(),
            closed: false,
        })
    }
}

pub struct FakeSession {
    provider: FakeProvider,
    viewport: Viewport,
    path: Option<String>,
    behavior: PageBehavior,
    loaded_at: Option<Instant>,
    details_open: bool,
    overrides: NormalizedStyles,
    closed: bool,
}

impl FakeSession {
    fn log(&self, event: String) {
        self.provider.events.lock().unwrap().push(event);
    }

    fn path(&self) -> &str {
        self.path.as_deref().unwrap_or("?")
    }
}

impl RenderSession for FakeSession {
    async fn load(&mut self, url: &str) -> Result<()> {
        let path = url.strip_prefix(BASE_URL).unwrap_or(url).to_string();
        self.behavior = self.provider.pages.get(&path).cloned().unwrap_or_default();
        self.log(format!("load {}", path));
        self.path = Some(path);
        if self.behavior.hang_load {
            std::future::pending::<()>().await;
        }
        if self.behavior.fail_load {
            return Err(Error::SessionError("net::ERR_CONNECTION_REFUSED".into()));
        }
        // Panels start open, as if the user left them that way
        self.details_open = true;
        self.loaded_at = Some(Instant::now());
        Ok(())
    }

    async fn hide_details_panel(&mut self) -> Result<()> {
        self.details_open = false;
        self.log(format!("hide {}", self.path()));
        Ok(())
    }

    async fn theme_class(&mut self) -> Result<Option<String>> {
        Ok(self.behavior.body_class.clone())
    }

    async fn style_sheets(&mut self) -> Result<Vec<StyleSheet>> {
        Ok(self.overrides.apply_to(&self.behavior.sheets))
    }

    async fn apply_style_overrides(&mut self, overrides: &NormalizedStyles) -> Result<()> {
        self.log(format!("styles {} {}", self.path(), overrides.overrides.len()));
        self.overrides = overrides.clone();
        Ok(())
    }

    async fn chart_containers(&mut self, ids: &[&str]) -> Result<Vec<ChartContainer>> {
        if self.behavior.reopen_details {
            self.details_open = true;
        }
        let ready = match (self.behavior.charts_ready_after, self.loaded_at) {
            (Some(after), Some(at)) => at.elapsed() >= after,
            _ => false,
        };
        Ok(ids
            .iter()
            .map(|id| {
                let present = self.behavior.charts_present.contains(id);
                ChartContainer {
                    id: id.to_string(),
                    present,
                    populated: present && ready,
                }
            })
            .collect())
    }

    async fn rasterize(&mut self, _options: &RasterOptions) -> Result<Bitmap> {
        let details = if self.details_open { "open" } else { "closed" };
        self.log(format!("raster {} details={}", self.path(), details));
        if self.behavior.fail_rasterize {
            return Err(Error::SessionError("tainted canvas".into()));
        }
        Bitmap::from_png(solid_png(self.viewport.width / 160, self.viewport.height / 160))
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.provider.counters.closed.fetch_add(1, Ordering::SeqCst);
            self.provider.counters.live.fetch_sub(1, Ordering::SeqCst);
            self.log(format!("close {}", self.path()));
        }
        Ok(())
    }
}

pub fn solid_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width.max(1), height.max(1), image::Rgba([94, 151, 248, 255]));
    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    png
}

/// Keeps delivered files in memory
#[derive(Default)]
pub struct MemoryDelivery {
    pub files: Vec<(String, Vec<u8>)>,
}

impl Delivery for MemoryDelivery {
    fn deliver(&mut self, file_name: &str, bytes: &[u8]) -> Result<()> {
        self.files.push((file_name.to_string(), bytes.to_vec()));
        Ok(())
    }
}
