//! Chrome DevTools Protocol capture surface

use crate::geometry::{BoxMetrics, DocumentMetrics};
use crate::mask::{CaptureFilter, Exclusion};
use crate::metadata::PageInfo;
use crate::surface::{CaptureSurface, ElementInfo, OverflowStyles, Region, ScrollPosition};
use crate::{encode, Error, Result, Viewport};
use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use image::RgbaImage;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Attribute holding an element's previous inline visibility while it is hidden from a capture
const HIDDEN_ATTR: &str = "data-pagestitch-hidden";

/// A headless Chrome tab used as a capture surface
///
/// Element exclusion is done by hiding rejected elements with
/// `visibility: hidden` around each screenshot, which keeps layout intact.
pub struct CdpSurface {
    _browser: Browser,
    tab: Arc<Tab>,
}

#[derive(Deserialize)]
struct RawElement {
    index: usize,
    id: Option<String>,
    attributes: Vec<String>,
    position: String,
}

#[derive(Deserialize)]
struct RawPageInfo {
    url: String,
    title: String,
    dpr: f64,
}

#[derive(Deserialize)]
struct RawBox {
    sw: u32,
    sh: u32,
    ow: u32,
    oh: u32,
    cw: u32,
    ch: u32,
}

impl From<RawBox> for BoxMetrics {
    fn from(b: RawBox) -> Self {
        BoxMetrics {
            scroll_width: b.sw,
            scroll_height: b.sh,
            offset_width: b.ow,
            offset_height: b.oh,
            client_width: b.cw,
            client_height: b.ch,
        }
    }
}

impl CdpSurface {
    /// Launch headless Chrome with a window of the given viewport size.
    pub fn launch(viewport: Viewport) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((viewport.width, viewport.height)))
            .build()
            .map_err(|e| Error::CdpError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::CdpError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::CdpError(format!("Failed to create tab: {}", e)))?;

        Ok(Self { _browser: browser, tab })
    }

    /// Navigate and wait for the page to settle.
    pub fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| Error::CdpError(format!("Navigation failed: {}", e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::CdpError(format!("Wait for navigation failed: {}", e)))?;
        std::thread::sleep(Duration::from_millis(500));
        Ok(())
    }

    /// Evaluate an expression that yields a JSON string and deserialize it.
    fn eval_json<T: DeserializeOwned>(&self, expression: &str, await_promise: bool) -> Result<T> {
        let remote = self
            .tab
            .evaluate(expression, await_promise)
            .map_err(|e| Error::Surface(format!("Script evaluation failed: {}", e)))?;
        let raw = remote
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| Error::Surface("Script returned no JSON string".into()))?;
        serde_json::from_str(&raw).map_err(|e| Error::Surface(format!("Unexpected script result: {}", e)))
    }

    fn eval(&self, expression: &str) -> Result<()> {
        self.tab
            .evaluate(expression, false)
            .map_err(|e| Error::Surface(format!("Script evaluation failed: {}", e)))?;
        Ok(())
    }

    fn list_elements(&self) -> Result<Vec<RawElement>> {
        self.eval_json(
            r#"JSON.stringify(Array.from(document.querySelectorAll('body *')).map(function(el, i) {
                return { index: i, id: el.id || null, attributes: el.getAttributeNames(),
                         position: getComputedStyle(el).position };
            }))"#,
            false,
        )
    }

    fn hide_and_mark(&self, hide: &[usize], mark: &[(usize, &str)], marker: &str) -> Result<()> {
        let script = format!(
            r#"(function(hide, mark, marker, attr) {{
                var els = Array.from(document.querySelectorAll('body *'));
                hide.forEach(function(i) {{
                    var el = els[i];
                    el.setAttribute(attr, el.style.visibility || '');
                    el.style.visibility = 'hidden';
                }});
                mark.forEach(function(m) {{ els[m[0]].setAttribute(marker, m[1]); }});
                return true;
            }})({}, {}, {}, {})"#,
            json(&hide)?,
            json(&mark)?,
            json(&marker)?,
            json(&HIDDEN_ATTR)?,
        );
        self.eval(&script)
    }

    fn unhide(&self) -> Result<()> {
        let script = format!(
            r#"document.querySelectorAll('[{attr}]').forEach(function(el) {{
                el.style.visibility = el.getAttribute('{attr}');
                el.removeAttribute('{attr}');
            }}); true"#,
            attr = HIDDEN_ATTR
        );
        self.eval(&script)
    }
}

fn json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Other(e.to_string()))
}

impl CaptureSurface for CdpSurface {
    fn viewport(&self) -> Result<Viewport> {
        let (width, height): (u32, u32) =
            self.eval_json("JSON.stringify([window.innerWidth, window.innerHeight])", false)?;
        Ok(Viewport { width, height })
    }

    fn document_metrics(&self) -> Result<DocumentMetrics> {
        let (body, root): (RawBox, RawBox) = self.eval_json(
            r#"JSON.stringify([document.body, document.documentElement].map(function(e) {
                return { sw: e.scrollWidth, sh: e.scrollHeight, ow: e.offsetWidth,
                         oh: e.offsetHeight, cw: e.clientWidth, ch: e.clientHeight };
            }))"#,
            false,
        )?;
        Ok(DocumentMetrics { body: body.into(), root: root.into() })
    }

    fn scroll_position(&self) -> Result<ScrollPosition> {
        let (x, y): (f64, f64) = self.eval_json(
            "JSON.stringify([window.scrollX || window.pageXOffset, window.scrollY || window.pageYOffset])",
            false,
        )?;
        Ok(ScrollPosition { x, y })
    }

    fn scroll_to(&mut self, position: ScrollPosition) -> Result<()> {
        self.eval(&format!("window.scrollTo({}, {}); true", position.x, position.y))
    }

    fn overflow_styles(&self) -> Result<OverflowStyles> {
        let (body, root): (String, String) = self.eval_json(
            "JSON.stringify([document.body.style.overflow, document.documentElement.style.overflow])",
            false,
        )?;
        Ok(OverflowStyles { body, root })
    }

    fn set_overflow_styles(&mut self, styles: &OverflowStyles) -> Result<()> {
        self.eval(&format!(
            "document.body.style.overflow = {}; document.documentElement.style.overflow = {}; true",
            json(&styles.body)?,
            json(&styles.root)?
        ))
    }

    fn set_overlay_visible(&mut self, overlay_id: &str, visible: bool) -> Result<()> {
        self.eval(&format!(
            "(function(el) {{ if (el) {{ el.style.visibility = {}; }} return true; }})(document.getElementById({}))",
            json(if visible { "visible" } else { "hidden" })?,
            json(overlay_id)?
        ))
    }

    fn wait_for_paint(&mut self) -> Result<()> {
        self.tab
            .evaluate(
                "new Promise(function(r) { requestAnimationFrame(function() { r(true); }); })",
                true,
            )
            .map_err(|e| Error::Surface(format!("Waiting for paint failed: {}", e)))?;
        Ok(())
    }

    fn capture(&mut self, region: Region, filter: &CaptureFilter<'_>) -> Result<RgbaImage> {
        let elements = self.list_elements()?;
        let mut hide = Vec::new();
        let mut mark = Vec::new();
        for raw in elements {
            let position = raw.position.parse().unwrap_or_default();
            let info = ElementInfo {
                id: raw.id,
                attributes: raw.attributes.into_iter().map(|a| (a, String::new())).collect(),
                position,
            };
            match filter.decide(&info) {
                Exclusion::Keep => {}
                Exclusion::Skip => hide.push(raw.index),
                Exclusion::SkipFixed(pos) => {
                    hide.push(raw.index);
                    mark.push((raw.index, pos.as_str()));
                }
            }
        }
        debug!("Hiding {} element(s), {} fixed", hide.len(), mark.len());
        self.hide_and_mark(&hide, &mark, filter.marker_attribute())?;

        let clip = Page::Viewport {
            x: region.x as f64,
            y: region.y as f64,
            width: region.width as f64,
            height: region.height as f64,
            scale: 1.0,
        };
        // Tiles span the full page width, so render outside the viewport too
        let shot = self
            .tab
            .call_method(Page::CaptureScreenshot {
                format: Some(Page::CaptureScreenshotFormatOption::Png),
                quality: None,
                clip: Some(clip),
                from_surface: Some(true),
                capture_beyond_viewport: Some(true),
                optimize_for_speed: None,
            })
            .map_err(|e| Error::Surface(format!("Screenshot failed: {}", e)));

        // Unhide even when the screenshot failed
        if let Err(e) = self.unhide() {
            warn!("Failed to unhide masked elements: {}", e);
        }
        let png = base64::engine::general_purpose::STANDARD
            .decode(shot?.data)
            .map_err(|e| Error::Surface(format!("Screenshot payload is not base64: {}", e)))?;
        encode::decode(&png)
    }

    fn clear_marker(&mut self, attribute: &str) -> Result<()> {
        self.eval(&format!(
            "(function(a) {{ document.querySelectorAll('[' + a + ']').forEach(function(el) {{ el.removeAttribute(a); }}); return true; }})({})",
            json(attribute)?
        ))
    }

    fn element_rect(&self, selector: &str) -> Result<Option<Region>> {
        let rect: Option<(f64, f64, f64, f64)> = self.eval_json(
            &format!(
                r#"JSON.stringify((function(el) {{
                    if (!el) return null;
                    var r = el.getBoundingClientRect();
                    return [r.left + window.scrollX, r.top + window.scrollY, r.width, r.height];
                }})(document.querySelector({})))"#,
                json(selector)?
            ),
            false,
        )?;
        Ok(rect.map(|(x, y, w, h)| Region {
            x: x.max(0.0).round() as u32,
            y: y.max(0.0).round() as u32,
            width: w.ceil() as u32,
            height: h.ceil() as u32,
        }))
    }

    fn page_info(&self) -> Result<PageInfo> {
        let raw: RawPageInfo = self.eval_json(
            "JSON.stringify({ url: window.location.href, title: document.title, dpr: window.devicePixelRatio || 1 })",
            false,
        )?;
        Ok(PageInfo {
            url: Some(raw.url),
            title: Some(raw.title).filter(|t| !t.is_empty()),
            device_pixel_ratio: raw.dpr,
        })
    }
}
