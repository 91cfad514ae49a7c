//! Static backend: fetch pages over HTTP and paint them without a browser.
//!
//! Each session performs a plain GET, collects the page's inline and linked
//! style sheets, and rasterizes a block-level preview through
//! [`crate::rendering`]. No JavaScript runs, so chart containers are only
//! populated if the server already rendered them.

use crate::rendering::{layout, paint, raster};
use crate::session::{ChartContainer, RenderSession, SessionProvider};
use crate::style::{NormalizedStyles, StyleRule, StyleSheet};
use crate::{Bitmap, Error, ExportConfig, RasterOptions, Result, Viewport};
use crate::{DETAILS_OPEN_CLASS, DETAILS_PANEL_ID};
use futures::future::join_all;
use log::{debug, warn};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Hands out sessions sharing one HTTP client
#[derive(Clone)]
pub struct StaticProvider {
    client: Client,
}

impl StaticProvider {
    pub fn new(config: &ExportConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::DependencyMissing(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl SessionProvider for StaticProvider {
    type Session = StaticSession;

    async fn open(&self, viewport: Viewport) -> Result<StaticSession> {
        Ok(StaticSession {
            client: self.client.clone(),
            viewport,
            html: None,
            url: None,
            sheets: Vec::new(),
            details_hidden: false,
            closed: false,
        })
    }
}

/// One fetched page and the style state local to it
pub struct StaticSession {
    client: Client,
    viewport: Viewport,
    html: Option<String>,
    url: Option<String>,
    sheets: Vec<StyleSheet>,
    details_hidden: bool,
    closed: bool,
}

impl StaticSession {
    fn document(&self) -> Result<&str> {
        if self.closed {
            return Err(Error::SessionError("session already closed".into()));
        }
        self.html
            .as_deref()
            .ok_or_else(|| Error::SessionError("No document loaded".into()))
    }
}

impl RenderSession for StaticSession {
    async fn load(&mut self, url: &str) -> Result<()> {
        if self.closed {
            return Err(Error::SessionError("session already closed".into()));
        }
        let page_url = Url::parse(url)
            .map_err(|e| Error::SessionError(format!("Invalid page URL {}: {}", url, e)))?;

        let resp = self
            .client
            .get(page_url.clone())
            .send()
            .await
            .map_err(|e| Error::SessionError(format!("HTTP GET failed: {}", e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::LoadError {
                path: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }
        let body = resp
            .text()
            .await
            .map_err(|e| Error::SessionError(format!("Failed to read response body: {}", e)))?;

        let scan = scan_styles(&body, &page_url)?;
        let mut sheets: Vec<StyleSheet> = scan
            .inline
            .iter()
            .map(|css| StyleSheet::readable(None, parse_css_rules(css)))
            .collect();

        let fetched = join_all(
            scan.linked
                .iter()
                .map(|href| fetch_sheet(&self.client, &page_url, href)),
        )
        .await;
        sheets.extend(fetched);

        debug!("loaded {} ({} bytes, {} style sheet(s))", url, body.len(), sheets.len());
        self.html = Some(body);
        self.url = Some(url.to_string());
        self.sheets = sheets;
        self.details_hidden = false;
        Ok(())
    }

    async fn hide_details_panel(&mut self) -> Result<()> {
        self.document()?;
        self.details_hidden = true;
        Ok(())
    }

    async fn theme_class(&mut self) -> Result<Option<String>> {
        let html = self.document()?;
        let document = Html::parse_document(html);
        Ok(layout::find_body(&document).and_then(|b| b.value().attr("class").map(str::to_string)))
    }

    async fn style_sheets(&mut self) -> Result<Vec<StyleSheet>> {
        self.document()?;
        Ok(self.sheets.clone())
    }

    async fn apply_style_overrides(&mut self, overrides: &NormalizedStyles) -> Result<()> {
        self.document()?;
        self.sheets = overrides.apply_to(&self.sheets);
        Ok(())
    }

    async fn chart_containers(&mut self, ids: &[&str]) -> Result<Vec<ChartContainer>> {
        let html = self.document()?;
        let document = Html::parse_document(html);
        Ok(ids
            .iter()
            .map(|id| {
                Ok(match find_by_id(&document, id)? {
                    Some(el) => ChartContainer {
                        id: id.to_string(),
                        present: true,
                        populated: has_content(el),
                    },
                    None => ChartContainer {
                        id: id.to_string(),
                        present: false,
                        populated: false,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?)
    }

    async fn rasterize(&mut self, options: &RasterOptions) -> Result<Bitmap> {
        let html = self.document()?;
        let document = Html::parse_document(html);
        let details_visible = !self.details_hidden && details_open(&document)?;

        let page = layout::layout_document(&document, self.viewport, details_visible);
        let resolver = paint::StyleResolver::new(&self.sheets);
        let cmds = paint::paint_layout(&page, &resolver);
        let shot = raster::rasterize(&cmds, page.width, page.height, options.scale)?;
        Ok(Bitmap {
            png: shot.png_data,
            width: shot.width,
            height: shot.height,
        })
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.html = None;
            self.sheets.clear();
            if let Some(url) = &self.url {
                debug!("closed static session for {}", url);
            }
        }
        Ok(())
    }
}

/// Style sources found in a page
#[derive(Debug, Default, PartialEq)]
struct StyleScan {
    inline: Vec<String>,
    linked: Vec<String>,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::SessionError(format!("Invalid selector {}: {:?}", css, e)))
}

fn scan_styles(html: &str, base: &Url) -> Result<StyleScan> {
    let document = Html::parse_document(html);
    let mut scan = StyleScan::default();

    for node in document.select(&selector("style")?) {
        let css = node.text().collect::<String>();
        if !css.trim().is_empty() {
            scan.inline.push(css);
        }
    }

    for node in document.select(&selector(r#"link[rel~="stylesheet"][href]"#)?) {
        if let Some(href) = node.value().attr("href") {
            let resolved = base
                .join(href)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| href.to_string());
            scan.linked.push(resolved);
        }
    }
    Ok(scan)
}

/// Fetch a linked sheet. Cross-origin and unfetchable sheets come back
/// unreadable, the way a browser refuses to expose their rules.
async fn fetch_sheet(client: &Client, page: &Url, href: &str) -> StyleSheet {
    let sheet_url = match Url::parse(href) {
        Ok(u) => u,
        Err(e) => return StyleSheet::unreadable(href, format!("invalid URL: {}", e)),
    };
    if sheet_url.origin() != page.origin() {
        return StyleSheet::unreadable(href, "cross-origin rules are not accessible");
    }
    let resp = match client.get(sheet_url).send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => return StyleSheet::unreadable(href, format!("HTTP {}", r.status())),
        Err(e) => {
            warn!("Failed to fetch style sheet {}: {}", href, e);
            return StyleSheet::unreadable(href, e.to_string());
        }
    };
    match resp.text().await {
        Ok(css) => StyleSheet::readable(Some(href.to_string()), parse_css_rules(&css)),
        Err(e) => StyleSheet::unreadable(href, e.to_string()),
    }
}

fn find_by_id<'a>(document: &'a Html, id: &str) -> Result<Option<ElementRef<'a>>> {
    Ok(document.select(&selector(&format!("#{}", id))?).next())
}

/// Mirrors `innerHTML !== ''`: any child node counts, whitespace text included
fn has_content(el: ElementRef<'_>) -> bool {
    el.children().next().is_some()
}

fn details_open(document: &Html) -> Result<bool> {
    Ok(find_by_id(document, DETAILS_PANEL_ID)?.is_some_and(|panel| {
        panel.value().classes().any(|c| c == DETAILS_OPEN_CLASS)
            && panel.value().attr("hidden").is_none()
    }))
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Extract the background declarations of each top-level rule.
/// At-rule blocks such as `@media` are skipped whole.
pub fn parse_css_rules(css: &str) -> Vec<StyleRule> {
    let css = strip_comments(css);
    let mut rules = Vec::new();
    let mut rest = css.as_str();

    while let Some(open) = rest.find('{') {
        // Statements like `@import "x";` end before the next block
        let prelude = rest[..open].rsplit(';').next().unwrap_or("").trim();
        let after = &rest[open + 1..];

        if prelude.starts_with('@') {
            let mut depth = 1usize;
            let mut consumed = after.len();
            for (i, ch) in after.char_indices() {
                match ch {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            consumed = i + 1;
                            break;
                        }
                    }
                    _ => {}
                }
            }
            rest = &after[consumed..];
            continue;
        }

        let close = after.find('}').unwrap_or(after.len());
        let mut rule = StyleRule {
            selector: prelude.to_string(),
            ..Default::default()
        };
        for decl in after[..close].split(';') {
            let Some((prop, value)) = decl.split_once(':') else {
                continue;
            };
            let value = value.trim().to_string();
            match prop.trim().to_ascii_lowercase().as_str() {
                "background" => rule.background = Some(value),
                "background-color" => rule.background_color = Some(value),
                _ => {}
            }
        }
        if !rule.selector.is_empty() && (rule.background.is_some() || rule.background_color.is_some()) {
            rules.push(rule);
        }
        rest = after.get(close + 1..).unwrap_or("");
    }
    rules
}
