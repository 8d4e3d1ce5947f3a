//! Capture surfaces: the live page a stitcher scrolls and rasterizes
//!
//! A surface bundles the page accessors (viewport, document size, scroll
//! position, root overflow styles, feedback overlay visibility) with the
//! bitmap-capture primitive. The stitcher borrows a surface exclusively for
//! the duration of a capture, so every read and write is sequenced.

pub mod synthetic;

pub use synthetic::{CaptureRecord, SyntheticElement, SyntheticPage};

use crate::geometry::DocumentMetrics;
use crate::mask::CaptureFilter;
use crate::metadata::PageInfo;
use crate::{Error, Result, Viewport};
use image::RgbaImage;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Computed CSS `position` of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CssPosition {
    #[default]
    Static,
    Relative,
    Absolute,
    Fixed,
    Sticky,
}

impl CssPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            CssPosition::Static => "static",
            CssPosition::Relative => "relative",
            CssPosition::Absolute => "absolute",
            CssPosition::Fixed => "fixed",
            CssPosition::Sticky => "sticky",
        }
    }

    /// Fixed and sticky elements stay put while the page scrolls.
    pub fn is_viewport_anchored(&self) -> bool {
        matches!(self, CssPosition::Fixed | CssPosition::Sticky)
    }
}

impl FromStr for CssPosition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "static" => Ok(CssPosition::Static),
            "relative" => Ok(CssPosition::Relative),
            "absolute" => Ok(CssPosition::Absolute),
            "fixed" => Ok(CssPosition::Fixed),
            "sticky" | "-webkit-sticky" => Ok(CssPosition::Sticky),
            other => Err(Error::Surface(format!("unknown position value '{}'", other))),
        }
    }
}

/// What the exclusion predicate gets to see of an element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementInfo {
    pub id: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub position: CssPosition,
}

impl ElementInfo {
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }
}

/// A rectangle in document coordinates (CSS pixels)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Window scroll offset. Browsers report fractional offsets on scaled displays.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

/// Inline `overflow` styles of `<body>` and `<html>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverflowStyles {
    pub body: String,
    pub root: String,
}

/// The live page a capture runs against.
pub trait CaptureSurface {
    /// Whether the bitmap-capture primitive is usable at all.
    fn supports_capture(&self) -> bool {
        true
    }

    /// Current viewport size
    fn viewport(&self) -> Result<Viewport>;

    /// Size sources of `<body>` and `<html>`
    fn document_metrics(&self) -> Result<DocumentMetrics>;

    fn scroll_position(&self) -> Result<ScrollPosition>;

    fn scroll_to(&mut self, position: ScrollPosition) -> Result<()>;

    fn overflow_styles(&self) -> Result<OverflowStyles>;

    fn set_overflow_styles(&mut self, styles: &OverflowStyles) -> Result<()>;

    /// Show or hide the feedback overlay rooted at `overlay_id`.
    fn set_overlay_visible(&mut self, overlay_id: &str, visible: bool) -> Result<()>;

    /// Block until the page has had a chance to paint after a scroll.
    fn wait_for_paint(&mut self) -> Result<()> {
        Ok(())
    }

    /// Rasterize `region` (document coordinates), skipping every element the
    /// filter rejects. Elements for which the filter answers
    /// [`Exclusion::SkipFixed`](crate::mask::Exclusion::SkipFixed) must be
    /// tagged with [`CaptureFilter::marker_attribute`].
    fn capture(&mut self, region: Region, filter: &CaptureFilter<'_>) -> Result<RgbaImage>;

    /// Remove `attribute` from every element carrying it.
    fn clear_marker(&mut self, attribute: &str) -> Result<()>;

    /// Bounding box of the first element matching `selector`, in document coordinates.
    fn element_rect(&self, selector: &str) -> Result<Option<Region>>;

    /// URL, title and pixel ratio of the page, where the surface knows them.
    fn page_info(&self) -> Result<PageInfo> {
        Ok(PageInfo::default())
    }
}

impl<S: CaptureSurface + ?Sized> CaptureSurface for Box<S> {
    fn supports_capture(&self) -> bool {
        (**self).supports_capture()
    }

    fn viewport(&self) -> Result<Viewport> {
        (**self).viewport()
    }

    fn document_metrics(&self) -> Result<DocumentMetrics> {
        (**self).document_metrics()
    }

    fn scroll_position(&self) -> Result<ScrollPosition> {
        (**self).scroll_position()
    }

    fn scroll_to(&mut self, position: ScrollPosition) -> Result<()> {
        (**self).scroll_to(position)
    }

    fn overflow_styles(&self) -> Result<OverflowStyles> {
        (**self).overflow_styles()
    }

    fn set_overflow_styles(&mut self, styles: &OverflowStyles) -> Result<()> {
        (**self).set_overflow_styles(styles)
    }

    fn set_overlay_visible(&mut self, overlay_id: &str, visible: bool) -> Result<()> {
        (**self).set_overlay_visible(overlay_id, visible)
    }

    fn wait_for_paint(&mut self) -> Result<()> {
        (**self).wait_for_paint()
    }

    fn capture(&mut self, region: Region, filter: &CaptureFilter<'_>) -> Result<RgbaImage> {
        (**self).capture(region, filter)
    }

    fn clear_marker(&mut self, attribute: &str) -> Result<()> {
        (**self).clear_marker(attribute)
    }

    fn element_rect(&self, selector: &str) -> Result<Option<Region>> {
        (**self).element_rect(selector)
    }

    fn page_info(&self) -> Result<PageInfo> {
        (**self).page_info()
    }
}
