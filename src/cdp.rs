//! Chrome DevTools Protocol backend
//!
//! A single headless Chrome process is owned by a dedicated worker thread.
//! Each rendering session is a fresh tab, created for one page capture and
//! closed when the session is released. Async callers talk to the worker
//! over a command channel and receive replies on oneshot channels, so the
//! synchronous `headless_chrome` API never blocks the runtime.

use crate::session::{ChartContainer, RenderSession, SessionProvider};
use crate::style::{NormalizedStyles, StyleRule, StyleSheet};
use crate::{
    Bitmap, Error, ExportConfig, RasterOptions, Result, Viewport, DETAILS_OPEN_CLASS,
    DETAILS_PANEL_ID,
};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

/// Stand-in for "no load bound": the protocol client needs a finite timeout
const UNBOUNDED_LOAD: Duration = Duration::from_secs(24 * 60 * 60);

/// Id of the style element that carries normalized overrides
const OVERRIDE_STYLE_ID: &str = "__dashexport_overrides";

type TabId = u64;

enum Command {
    Ping(oneshot::Sender<Result<()>>),
    OpenTab(oneshot::Sender<Result<TabId>>),
    Goto(TabId, String, oneshot::Sender<Result<()>>),
    Eval(TabId, String, oneshot::Sender<Result<String>>),
    Screenshot(TabId, Page::Viewport, oneshot::Sender<Result<Vec<u8>>>),
    CloseTab(TabId),
}

/// Provides tabs of a headless Chrome owned by a worker thread
pub struct ChromeProvider {
    cmd_tx: Sender<Command>,
    viewport: Viewport,
}

impl ChromeProvider {
    /// Launch headless Chrome. Failure to launch means the rendering
    /// collaborator is missing.
    pub async fn launch(config: &ExportConfig) -> Result<Self> {
        let viewport = config.viewport;
        let user_agent = config.user_agent.clone();
        let load_timeout = config.load_timeout().unwrap_or(UNBOUNDED_LOAD);

        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel::<Result<()>>();

        thread::spawn(move || {
            let browser = match launch_browser(viewport) {
                Ok(b) => b,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };
            let _ = init_tx.send(Ok(()));

            let mut tabs: HashMap<TabId, Arc<Tab>> = HashMap::new();
            let mut next_id: TabId = 1;

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Ping(resp) => {
                        let res = browser
                            .get_version()
                            .map(|_| ())
                            .map_err(|e| Error::DependencyMissing(format!("Chrome is not responding: {}", e)));
                        let _ = resp.send(res);
                    }
                    Command::OpenTab(resp) => {
                        let res = open_tab(&browser, &user_agent, load_timeout).map(|tab| {
                            let id = next_id;
                            next_id += 1;
                            tabs.insert(id, tab);
                            id
                        });
                        let _ = resp.send(res);
                    }
                    Command::Goto(id, url, resp) => {
                        let res = with_tab(&tabs, id).and_then(|tab| navigate(&tab, &url));
                        let _ = resp.send(res);
                    }
                    Command::Eval(id, script, resp) => {
                        let res = with_tab(&tabs, id).and_then(|tab| evaluate(&tab, &script));
                        let _ = resp.send(res);
                    }
                    Command::Screenshot(id, clip, resp) => {
                        let res = with_tab(&tabs, id).and_then(|tab| {
                            tab.capture_screenshot(
                                Page::CaptureScreenshotFormatOption::Png,
                                None,
                                Some(clip),
                                true,
                            )
                            .map_err(|e| Error::SessionError(format!("Screenshot failed: {}", e)))
                        });
                        let _ = resp.send(res);
                    }
                    Command::CloseTab(id) => {
                        if let Some(tab) = tabs.remove(&id) {
                            if let Err(e) = tab.close(true) {
                                warn!("Failed to close tab {}: {}", id, e);
                            }
                        }
                    }
                }
            }
            // Channel closed: dropping the browser terminates the child process
            drop(tabs);
            drop(browser);
        });

        init_rx
            .await
            .map_err(|e| Error::DependencyMissing(format!("Chrome worker init canceled: {}", e)))??;

        Ok(Self { cmd_tx, viewport })
    }
}

impl SessionProvider for ChromeProvider {
    type Session = ChromeSession;

    async fn probe(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Ping(tx))
            .map_err(|_| Error::DependencyMissing("Chrome worker has stopped".into()))?;
        rx.await
            .map_err(|_| Error::DependencyMissing("Chrome worker has stopped".into()))?
    }

    async fn open(&self, viewport: Viewport) -> Result<ChromeSession> {
        if viewport != self.viewport {
            warn!(
                "Requested {}x{} surface but Chrome was launched at {}x{}",
                viewport.width, viewport.height, self.viewport.width, self.viewport.height
            );
        }
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::OpenTab(tx));
        let tab = rx
            .await
            .map_err(|e| Error::Other(format!("OpenTab canceled: {}", e)))??;
        debug!("opened tab {}", tab);
        Ok(ChromeSession {
            cmd_tx: self.cmd_tx.clone(),
            tab,
            closed: false,
        })
    }
}

fn launch_browser(viewport: Viewport) -> Result<Browser> {
    let launch_options = LaunchOptions::default_builder()
        .headless(true)
        .window_size(Some((viewport.width, viewport.height)))
        .build()
        .map_err(|e| Error::DependencyMissing(format!("Failed to build launch options: {}", e)))?;

    Browser::new(launch_options)
        .map_err(|e| Error::DependencyMissing(format!("Failed to launch headless Chrome: {}", e)))
}

fn open_tab(browser: &Browser, user_agent: &str, load_timeout: Duration) -> Result<Arc<Tab>> {
    let tab = browser
        .new_tab()
        .map_err(|e| Error::SessionError(format!("Failed to create tab: {}", e)))?;
    tab.set_user_agent(user_agent, None, None)
        .map_err(|e| Error::SessionError(format!("Failed to set user agent: {}", e)))?;
    tab.set_default_timeout(load_timeout);
    Ok(tab)
}

fn with_tab(tabs: &HashMap<TabId, Arc<Tab>>, id: TabId) -> Result<Arc<Tab>> {
    tabs.get(&id)
        .cloned()
        .ok_or_else(|| Error::SessionError(format!("Tab {} is closed", id)))
}

fn navigate(tab: &Tab, url: &str) -> Result<()> {
    tab.navigate_to(url).map_err(|e| Error::LoadError {
        path: url.to_string(),
        reason: format!("Navigation failed: {}", e),
    })?;
    tab.wait_until_navigated().map_err(|e| Error::LoadError {
        path: url.to_string(),
        reason: format!("Wait for navigation failed: {}", e),
    })?;
    Ok(())
}

fn evaluate(tab: &Tab, script: &str) -> Result<String> {
    let result = tab
        .evaluate(script, false)
        .map_err(|e| Error::SessionError(format!("Evaluation failed: {}", e)))?;
    match result.value {
        Some(serde_json::Value::String(s)) => Ok(s),
        Some(other) => Ok(other.to_string()),
        None => Err(Error::SessionError("No value returned from evaluation".into())),
    }
}

/// One Chrome tab used as an isolated rendering surface
pub struct ChromeSession {
    cmd_tx: Sender<Command>,
    tab: TabId,
    closed: bool,
}

#[derive(Deserialize)]
struct RawSheet {
    href: Option<String>,
    #[serde(default)]
    rules: Option<Vec<StyleRule>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct BodySize {
    width: f64,
    height: f64,
}

impl ChromeSession {
    async fn eval(&self, script: String) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Eval(self.tab, script, tx));
        rx.await
            .map_err(|e| Error::Other(format!("Eval canceled: {}", e)))?
    }

    async fn eval_json<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let text = self.eval(script).await?;
        serde_json::from_str(&text)
            .map_err(|e| Error::SessionError(format!("Unexpected script result {:?}: {}", text, e)))
    }
}

impl RenderSession for ChromeSession {
    async fn load(&mut self, url: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Goto(self.tab, url.to_string(), tx));
        rx.await
            .map_err(|e| Error::Other(format!("Goto canceled: {}", e)))?
    }

    async fn hide_details_panel(&mut self) -> Result<()> {
        let script = format!(
            r#"(function() {{
                const details = document.getElementById({id});
                if (details) {{
                    details.classList.remove({open});
                    details.style.display = 'none';
                }}
                return JSON.stringify(!!details);
            }})()"#,
            id = js_string(DETAILS_PANEL_ID),
            open = js_string(DETAILS_OPEN_CLASS),
        );
        let found: bool = self.eval_json(script).await?;
        debug!("tab {}: details panel {}", self.tab, if found { "hidden" } else { "absent" });
        Ok(())
    }

    async fn theme_class(&mut self) -> Result<Option<String>> {
        let class: Option<String> = self
            .eval_json("JSON.stringify(document.body ? document.body.className : null)".into())
            .await?;
        Ok(class.filter(|c| !c.trim().is_empty()))
    }

    async fn style_sheets(&mut self) -> Result<Vec<StyleSheet>> {
        let script = r#"(function() {
            const out = [];
            for (const sheet of document.styleSheets) {
                try {
                    const rules = [];
                    for (const rule of (sheet.cssRules || sheet.rules)) {
                        if (!rule.style) continue;
                        rules.push({
                            selector: rule.selectorText || '',
                            background: rule.style.background || null,
                            background_color: rule.style.backgroundColor || null
                        });
                    }
                    out.push({ href: sheet.href, rules: rules });
                } catch (e) {
                    out.push({ href: sheet.href, error: String(e) });
                }
            }
            return JSON.stringify(out);
        })()"#;
        let raw: Vec<RawSheet> = self.eval_json(script.to_string()).await?;
        Ok(raw
            .into_iter()
            .map(|s| match (s.rules, s.error) {
                (Some(rules), None) => StyleSheet::readable(s.href, rules),
                (_, error) => StyleSheet::unreadable(
                    s.href.unwrap_or_else(|| "<inline>".into()),
                    error.unwrap_or_else(|| "rules unavailable".into()),
                ),
            })
            .collect())
    }

    async fn apply_style_overrides(&mut self, overrides: &NormalizedStyles) -> Result<()> {
        // Replacing the text of a single element keeps repeated calls idempotent
        let script = format!(
            r#"(function(css) {{
                let el = document.getElementById({id});
                if (!el) {{
                    el = document.createElement('style');
                    el.id = {id};
                    (document.head || document.documentElement).appendChild(el);
                }}
                el.textContent = css;
                return JSON.stringify(true);
            }})({css})"#,
            id = js_string(OVERRIDE_STYLE_ID),
            css = js_string(&overrides.to_css()),
        );
        let _: bool = self.eval_json(script).await?;
        Ok(())
    }

    async fn chart_containers(&mut self, ids: &[&str]) -> Result<Vec<ChartContainer>> {
        let ids_json = serde_json::to_string(ids)
            .map_err(|e| Error::Other(format!("Failed to encode ids: {}", e)))?;
        let script = format!(
            r#"(function(ids) {{
                return JSON.stringify(ids.map(function(id) {{
                    const el = document.getElementById(id);
                    return {{ id: id, present: !!el, populated: !!el && el.innerHTML !== '' }};
                }}));
            }})({})"#,
            ids_json
        );
        self.eval_json(script).await
    }

    /// Screenshots the full body at `options.scale`. Chrome paints
    /// cross-origin images regardless, so `allow_cross_origin` is implied.
    async fn rasterize(&mut self, options: &RasterOptions) -> Result<Bitmap> {
        let size: BodySize = self
            .eval_json(
                "JSON.stringify({ width: document.body.scrollWidth, height: document.body.scrollHeight })"
                    .into(),
            )
            .await?;
        let clip = Page::Viewport {
            x: 0.0,
            y: 0.0,
            width: size.width.max(1.0),
            height: size.height.max(1.0),
            scale: options.scale,
        };

        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Screenshot(self.tab, clip, tx));
        let png = rx
            .await
            .map_err(|e| Error::Other(format!("Screenshot canceled: {}", e)))??;
        Bitmap::from_png(png)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            // The worker may already be gone, in which case the tab is too
            let _ = self.cmd_tx.send(Command::CloseTab(self.tab));
        }
        Ok(())
    }
}

/// Encode a Rust string as a JS string literal
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_escapes_quotes_and_newlines() {
        assert_eq!(js_string("a\"b\nc"), r#""a\"b\nc""#);
    }

    #[tokio::test]
    async fn test_chrome_provider_launch() {
        // This test requires Chrome to be installed, so we skip it in CI
        if std::env::var("CI").is_ok() {
            return;
        }
        let provider = match ChromeProvider::launch(&ExportConfig::default()).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Skipping Chrome launch test because Chrome is not available: {}", e);
                return;
            }
        };
        assert!(provider.probe().await.is_ok());
        let mut session = provider.open(Viewport::default()).await.expect("open tab");
        session.close().unwrap();
        session.close().unwrap();
    }
}
