//! Deterministic in-memory page for tests, benchmarks and the `demo` command
//!
//! The document background is a bitmap; positioned elements are painted over
//! it as solid rectangles. Scrolling is clamped to the scrollable range the
//! way a browser clamps `window.scrollTo`.

use super::{CaptureSurface, CssPosition, ElementInfo, OverflowStyles, Region, ScrollPosition};
use crate::geometry::{BoxMetrics, DocumentMetrics};
use crate::mask::{CaptureFilter, Exclusion};
use crate::metadata::PageInfo;
use crate::{Error, Result, Viewport};
use image::{Rgba, RgbaImage};
use std::collections::HashSet;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Background colour of document row `y` in [`SyntheticPage::striped`].
pub fn stripe_color(y: u32) -> Rgba<u8> {
    Rgba([(y % 251) as u8, ((y / 251) % 251) as u8, 96, 255])
}

/// A solid element painted on top of the document.
///
/// `rect` is in document coordinates, except for fixed and sticky elements
/// whose `rect` is relative to the viewport.
#[derive(Debug, Clone)]
pub struct SyntheticElement {
    pub info: ElementInfo,
    pub rect: Region,
    pub fill: Rgba<u8>,
}

impl SyntheticElement {
    pub fn new(id: &str, position: CssPosition, rect: Region, fill: Rgba<u8>) -> Self {
        Self {
            info: ElementInfo {
                id: Some(id.to_string()),
                attributes: Default::default(),
                position,
            },
            rect,
            fill,
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.info.attributes.insert(name.to_string(), value.to_string());
        self
    }

    fn id(&self) -> &str {
        self.info.id.as_deref().unwrap_or("")
    }
}

/// One call of the capture primitive, as observed by the page.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRecord {
    pub scroll: ScrollPosition,
    pub region: Region,
    /// Ids of the elements the filter rejected
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SyntheticPage {
    viewport: Viewport,
    content: RgbaImage,
    metrics: DocumentMetrics,
    scroll: ScrollPosition,
    overflow: OverflowStyles,
    elements: Vec<SyntheticElement>,
    page_info: PageInfo,
    hidden: HashSet<String>,
    supported: bool,
    fail_at: Option<usize>,
    capture_calls: usize,
    paints: usize,
    markers_set: usize,
    captures: Vec<CaptureRecord>,
}

impl SyntheticPage {
    /// A page whose document bitmap is `content`.
    pub fn new(viewport: Viewport, content: RgbaImage) -> Self {
        let (w, h) = content.dimensions();
        Self {
            viewport,
            metrics: DocumentMetrics {
                body: BoxMetrics::uniform(w, h),
                root: BoxMetrics {
                    client_width: viewport.width,
                    client_height: viewport.height,
                    ..BoxMetrics::uniform(w, h)
                },
            },
            content,
            scroll: ScrollPosition::default(),
            overflow: OverflowStyles::default(),
            elements: Vec::new(),
            page_info: PageInfo::default(),
            hidden: HashSet::new(),
            supported: true,
            fail_at: None,
            capture_calls: 0,
            paints: 0,
            markers_set: 0,
            captures: Vec::new(),
        }
    }

    /// A `width × height` document whose every row has its own colour.
    pub fn striped(viewport: Viewport, width: u32, height: u32) -> Self {
        let content = RgbaImage::from_fn(width, height, |_, y| stripe_color(y));
        Self::new(viewport, content)
    }

    pub fn with_element(mut self, element: SyntheticElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Override the size sources reported to the stitcher.
    pub fn with_metrics(mut self, metrics: DocumentMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_page_info(mut self, info: PageInfo) -> Self {
        self.page_info = info;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowStyles) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn scrolled_to(mut self, x: f64, y: f64) -> Self {
        self.scroll = self.clamp_scroll(ScrollPosition { x, y });
        self
    }

    /// Make the capture primitive unavailable.
    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    /// Make the `n`-th call (0-based) of the capture primitive fail.
    pub fn failing_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    pub fn captures(&self) -> &[CaptureRecord] {
        &self.captures
    }

    pub fn paints(&self) -> usize {
        self.paints
    }

    /// How many times an element was tagged with the fixed marker.
    pub fn markers_set(&self) -> usize {
        self.markers_set
    }

    pub fn element(&self, id: &str) -> Option<&SyntheticElement> {
        self.elements.iter().find(|e| e.id() == id)
    }

    pub fn is_hidden(&self, id: &str) -> bool {
        self.hidden.contains(id)
    }

    pub fn current_scroll(&self) -> ScrollPosition {
        self.scroll
    }

    pub fn current_overflow(&self) -> &OverflowStyles {
        &self.overflow
    }

    fn clamp_scroll(&self, pos: ScrollPosition) -> ScrollPosition {
        let (w, h) = self.content.dimensions();
        let max_x = w.saturating_sub(self.viewport.width) as f64;
        let max_y = h.saturating_sub(self.viewport.height) as f64;
        ScrollPosition {
            x: pos.x.clamp(0.0, max_x),
            y: pos.y.clamp(0.0, max_y),
        }
    }

    fn document_rect(&self, element: &SyntheticElement) -> Region {
        if element.info.position.is_viewport_anchored() {
            Region {
                x: element.rect.x + self.scroll.x.round() as u32,
                y: element.rect.y + self.scroll.y.round() as u32,
                ..element.rect
            }
        } else {
            element.rect
        }
    }
}

/// Paint the part of `rect` (document coordinates) that falls inside `region`.
fn paint(out: &mut RgbaImage, region: Region, rect: Region, fill: Rgba<u8>) {
    let x0 = rect.x.max(region.x);
    let y0 = rect.y.max(region.y);
    let x1 = (rect.x + rect.width).min(region.x + region.width);
    let y1 = (rect.y + rect.height).min(region.y + region.height);
    for y in y0..y1 {
        for x in x0..x1 {
            out.put_pixel(x - region.x, y - region.y, fill);
        }
    }
}

impl CaptureSurface for SyntheticPage {
    fn supports_capture(&self) -> bool {
        self.supported
    }

    fn viewport(&self) -> Result<Viewport> {
        Ok(self.viewport)
    }

    fn document_metrics(&self) -> Result<DocumentMetrics> {
        Ok(self.metrics)
    }

    fn scroll_position(&self) -> Result<ScrollPosition> {
        Ok(self.scroll)
    }

    fn scroll_to(&mut self, position: ScrollPosition) -> Result<()> {
        self.scroll = self.clamp_scroll(position);
        Ok(())
    }

    fn overflow_styles(&self) -> Result<OverflowStyles> {
        Ok(self.overflow.clone())
    }

    fn set_overflow_styles(&mut self, styles: &OverflowStyles) -> Result<()> {
        self.overflow = styles.clone();
        Ok(())
    }

    fn set_overlay_visible(&mut self, overlay_id: &str, visible: bool) -> Result<()> {
        if visible {
            self.hidden.remove(overlay_id);
        } else if self.element(overlay_id).is_some() {
            self.hidden.insert(overlay_id.to_string());
        }
        Ok(())
    }

    fn wait_for_paint(&mut self) -> Result<()> {
        self.paints += 1;
        Ok(())
    }

    fn capture(&mut self, region: Region, filter: &CaptureFilter<'_>) -> Result<RgbaImage> {
        if !self.supported {
            return Err(Error::CaptureUnsupported("synthetic page has no rasterizer".into()));
        }
        let call = self.capture_calls;
        self.capture_calls += 1;
        if self.fail_at == Some(call) {
            return Err(Error::Surface("rasterizer failed: canvas is tainted".into()));
        }

        let mut out = RgbaImage::from_pixel(region.width, region.height, WHITE);
        let (cw, ch) = self.content.dimensions();
        for y in 0..region.height {
            let doc_y = region.y + y;
            if doc_y >= ch {
                break;
            }
            for x in 0..region.width {
                let doc_x = region.x + x;
                if doc_x >= cw {
                    break;
                }
                out.put_pixel(x, y, *self.content.get_pixel(doc_x, doc_y));
            }
        }

        let mut skipped = Vec::new();
        let mut painted = Vec::new();
        let marker = filter.marker_attribute();
        for element in self.elements.iter_mut() {
            match filter.decide(&element.info) {
                Exclusion::Keep => {
                    if !self.hidden.contains(element.info.id.as_deref().unwrap_or("")) {
                        painted.push(element.clone());
                    }
                }
                Exclusion::Skip => skipped.push(element.id().to_string()),
                Exclusion::SkipFixed(position) => {
                    element
                        .info
                        .attributes
                        .insert(marker.to_string(), position.as_str().to_string());
                    self.markers_set += 1;
                    skipped.push(element.id().to_string());
                }
            }
        }
        for element in &painted {
            let rect = self.document_rect(element);
            paint(&mut out, region, rect, element.fill);
        }

        self.captures.push(CaptureRecord {
            scroll: self.scroll,
            region,
            skipped,
        });
        Ok(out)
    }

    fn clear_marker(&mut self, attribute: &str) -> Result<()> {
        for element in self.elements.iter_mut() {
            element.info.attributes.remove(attribute);
        }
        Ok(())
    }

    fn element_rect(&self, selector: &str) -> Result<Option<Region>> {
        let id = selector
            .strip_prefix('#')
            .ok_or_else(|| Error::Surface(format!("unsupported selector '{}'", selector)))?;
        Ok(self.element(id).map(|e| self.document_rect(e)))
    }

    fn page_info(&self) -> Result<PageInfo> {
        Ok(self.page_info.clone())
    }
}
