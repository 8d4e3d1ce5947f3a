//! Blazing Feedback page capture
//!
//! Full-page screenshot stitching for the feedback widget: the page is
//! scrolled one viewport at a time, each tile is rasterized through a
//! [`CaptureSurface`], fixed and sticky elements are masked so they are not
//! repeated in every tile, and the tiles are composited into one bitmap.
//!
//! # Features
//!
//! - **Synthetic surface**: deterministic in-memory page used by tests and the `demo` CLI
//! - **CDP surface** (`cdp` feature): drives a headless Chrome tab
//! - **Async facade**: a worker-thread backed [`async_api::Capturer`]
//!
//! # Example
//!
//! ```
//! use pagestitch::surface::SyntheticPage;
//! use pagestitch::{CaptureConfig, Stitcher, Viewport};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let page = SyntheticPage::striped(Viewport { width: 320, height: 200 }, 320, 900);
//! let mut stitcher = Stitcher::new(page);
//! let config = CaptureConfig {
//!     scroll_delay: std::time::Duration::ZERO,
//!     overlap: 40,
//!     ..Default::default()
//! };
//! let composite = stitcher.capture_full_page(&config)?;
//! assert_eq!(composite.tiles, 6);
//! assert_eq!(composite.bitmap.height(), 900);
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod composite;
pub mod encode;
pub mod events;
pub mod geometry;
pub mod guard;
pub mod mask;
pub mod metadata;
pub mod stitcher;
pub mod surface;

#[cfg(feature = "cdp")]
pub mod cdp;

// Async-friendly capture API (worker-thread backed)
pub mod async_api;

pub use composite::{CompositeImage, TileResult};
pub use encode::{EncodedImage, ImageFormat};
pub use events::{CaptureEvent, CaptureKind, CaptureObserver, Progress};
pub use geometry::{PageGeometry, Tile, TilePlan};
pub use guard::{CaptureLease, CaptureLock};
pub use mask::MaskPolicy;
pub use metadata::{CaptureMetadata, PageInfo};
pub use stitcher::Stitcher;
pub use surface::CaptureSurface;

/// Viewport dimensions in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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

/// Configuration for one full-page capture
///
/// The defaults match the capture module's own values. The feedback widget
/// asks for a slower, more overlapping capture; see [`CaptureConfig::widget`].
///
/// # Examples
///
/// ```
/// let cfg = pagestitch::CaptureConfig::default();
/// assert_eq!(cfg.overlap, 50);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Settle time after each scroll, applied after the next paint
    pub scroll_delay: Duration,
    /// Vertical overlap between consecutive tiles, in pixels
    pub overlap: u32,
    /// Hard cap on the page height processed, in pixels
    pub max_height: u32,
    /// Output encoding quality in `[0, 1]` (ignored by PNG)
    pub quality: f32,
    /// Output encoding format
    pub format: ImageFormat,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            scroll_delay: Duration::from_millis(300),
            overlap: 50,
            max_height: 30000,
            quality: 0.92,
            format: ImageFormat::Png,
        }
    }
}

impl CaptureConfig {
    /// Values used by the feedback widget's "full page" button.
    pub fn widget() -> Self {
        Self {
            scroll_delay: Duration::from_millis(400),
            overlap: 100,
            max_height: 50000,
            quality: 0.9,
            format: ImageFormat::Png,
        }
    }

    /// Merge caller-supplied overrides onto this configuration.
    pub fn merged(&self, overrides: &CaptureOverrides) -> Self {
        Self {
            scroll_delay: overrides
                .scroll_delay
                .map(Duration::from_millis)
                .unwrap_or(self.scroll_delay),
            overlap: overrides.overlap.unwrap_or(self.overlap),
            max_height: overrides.max_height.unwrap_or(self.max_height),
            quality: overrides.quality.unwrap_or(self.quality),
            format: overrides.format.unwrap_or(self.format),
        }
    }

    /// Check the parts of the configuration that do not depend on the page.
    ///
    /// `overlap` can only be checked against the viewport once it has been
    /// measured, see [`TilePlan::new`].
    pub fn validate(&self) -> Result<()> {
        if !self.quality.is_finite() || !(0.0..=1.0).contains(&self.quality) {
            return Err(Error::InvalidConfig(format!(
                "quality must be within [0, 1], got {}",
                self.quality
            )));
        }
        if self.max_height == 0 {
            return Err(Error::InvalidConfig("max_height must be positive".into()));
        }
        Ok(())
    }
}

/// Optional per-call overrides, as sent by the widget (`scrollDelay` in ms).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureOverrides {
    pub scroll_delay: Option<u64>,
    pub overlap: Option<u32>,
    pub max_height: Option<u32>,
    pub quality: Option<f32>,
    pub format: Option<ImageFormat>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CaptureConfig::default();
        assert_eq!(config.scroll_delay, Duration::from_millis(300));
        assert_eq!(config.overlap, 50);
        assert_eq!(config.max_height, 30000);
        assert_eq!(config.format, ImageFormat::Png);
    }

    #[test]
    fn test_viewport() {
        let viewport = Viewport::default();
        assert_eq!(viewport.width, 1280);
        assert_eq!(viewport.height, 720);
    }

    #[test]
    fn overrides_merge_onto_defaults() {
        let overrides: CaptureOverrides =
            serde_json::from_str(r#"{"scrollDelay": 0, "overlap": 0, "format": "jpeg"}"#).unwrap();
        let cfg = CaptureConfig::default().merged(&overrides);
        assert_eq!(cfg.scroll_delay, Duration::ZERO);
        // an explicit zero overlap is honoured, not replaced by the default
        assert_eq!(cfg.overlap, 0);
        assert_eq!(cfg.max_height, 30000);
        assert_eq!(cfg.format, ImageFormat::Jpeg);
    }

    #[test]
    fn quality_out_of_range_is_rejected() {
        let cfg = CaptureConfig { quality: 1.5, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
        let cfg = CaptureConfig { quality: f32::NAN, ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = CaptureConfig { max_height: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn widget_preset_values() {
        let cfg = CaptureConfig::widget();
        assert_eq!(cfg.overlap, 100);
        assert_eq!(cfg.max_height, 50000);
        assert!(cfg.validate().is_ok());
    }
}
