//! Environment details recorded alongside every capture

use crate::surface::CaptureSurface;
use crate::Result;
use serde::Serialize;
use std::time::SystemTime;

/// Document-level facts a surface knows about the page it shows.
#[derive(Debug, Clone, PartialEq)]
pub struct PageInfo {
    pub url: Option<String>,
    pub title: Option<String>,
    pub device_pixel_ratio: f64,
}

impl Default for PageInfo {
    fn default() -> Self {
        Self {
            url: None,
            title: None,
            device_pixel_ratio: 1.0,
        }
    }
}

/// What the page looked like when a capture was taken.
///
/// Serializes with the widget's field names (`viewportWidth`, `scrollY`,
/// `devicePixelRatio`, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMetadata {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub device_pixel_ratio: f64,
    pub url: Option<String>,
    pub title: Option<String>,
    pub timestamp: SystemTime,
}

impl CaptureMetadata {
    /// Read the current state of `surface`.
    pub fn collect<S: CaptureSurface + ?Sized>(surface: &S) -> Result<Self> {
        let viewport = surface.viewport()?;
        let scroll = surface.scroll_position()?;
        let info = surface.page_info()?;
        Ok(Self {
            viewport_width: viewport.width,
            viewport_height: viewport.height,
            scroll_x: scroll.x,
            scroll_y: scroll.y,
            device_pixel_ratio: info.device_pixel_ratio,
            url: info.url,
            title: info.title,
            timestamp: SystemTime::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SyntheticPage;
    use crate::Viewport;

    #[test]
    fn collects_viewport_scroll_and_page_info() {
        let page = SyntheticPage::striped(Viewport { width: 120, height: 80 }, 120, 400)
            .with_page_info(PageInfo {
                url: Some("https://example.test/pricing".into()),
                title: Some("Pricing".into()),
                device_pixel_ratio: 2.0,
            })
            .scrolled_to(0.0, 150.0);
        let meta = CaptureMetadata::collect(&page).unwrap();
        assert_eq!((meta.viewport_width, meta.viewport_height), (120, 80));
        assert_eq!(meta.scroll_y, 150.0);
        assert_eq!(meta.device_pixel_ratio, 2.0);
        assert_eq!(meta.title.as_deref(), Some("Pricing"));
    }

    #[test]
    fn serializes_with_widget_field_names() {
        let page = SyntheticPage::striped(Viewport { width: 10, height: 10 }, 10, 10);
        let json = serde_json::to_value(CaptureMetadata::collect(&page).unwrap()).unwrap();
        assert_eq!(json["viewportWidth"], 10);
        assert_eq!(json["devicePixelRatio"], 1.0);
        assert!(json["url"].is_null());
        assert!(json.get("timestamp").is_some());
    }
}
