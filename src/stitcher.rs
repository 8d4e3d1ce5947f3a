//! Full-page capture: scroll, capture each tile, composite, restore

use crate::composite::{composite, CompositeImage, TileResult};
use crate::encode::{self, EncodedImage, ImageFormat};
use crate::events::{notify, CaptureEvent, CaptureKind, CaptureObserver, LogObserver, Progress};
use crate::geometry::{PageGeometry, TilePlan};
use crate::guard::{CaptureLease, CaptureLock};
use crate::mask::{CaptureFilter, MaskPolicy};
use crate::metadata::CaptureMetadata;
use crate::surface::{CaptureSurface, OverflowStyles, Region, ScrollPosition};
use crate::{CaptureConfig, Error, Result};
use log::{debug, info, warn};
use std::time::Duration;

/// Quality used for single viewport and element captures
const SINGLE_CAPTURE_QUALITY: f32 = 0.9;

/// The most recent successful capture
#[derive(Debug, Clone)]
pub struct LastCapture {
    pub image: EncodedImage,
    pub metadata: CaptureMetadata,
}

/// Captures pages from a [`CaptureSurface`].
///
/// Every capture holds the stitcher's [`CaptureLock`] for its whole
/// duration. Clone the lock (see [`Stitcher::with_lock`]) to share the
/// single-capture guarantee with other stitchers.
pub struct Stitcher<S: CaptureSurface> {
    surface: S,
    lock: CaptureLock,
    policy: MaskPolicy,
    observer: Box<dyn CaptureObserver + Send>,
    last: Option<LastCapture>,
}

impl<S: CaptureSurface> Stitcher<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            lock: CaptureLock::new(),
            policy: MaskPolicy::default(),
            observer: Box::new(LogObserver),
            last: None,
        }
    }

    pub fn with_lock(mut self, lock: CaptureLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_policy(mut self, policy: MaskPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_observer<O>(mut self, observer: O) -> Self
    where
        O: CaptureObserver + Send + 'static,
    {
        self.observer = Box::new(observer);
        self
    }

    pub fn lock(&self) -> &CaptureLock {
        &self.lock
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Whether the surface can capture at all.
    pub fn is_available(&self) -> bool {
        self.surface.supports_capture()
    }

    pub fn last_capture(&self) -> Option<&LastCapture> {
        self.last.as_ref()
    }

    pub fn clear_last_capture(&mut self) {
        self.last = None;
    }

    /// Capture the whole scrollable page as one image.
    ///
    /// Fails with [`Error::CaptureInProgress`] if any capture sharing this
    /// stitcher's lock is running.
    pub fn capture_full_page(&mut self, config: &CaptureConfig) -> Result<CompositeImage> {
        let lease = self.lock.try_acquire()?;
        self.capture_full_page_leased(lease, config)
    }

    /// Like [`capture_full_page`](Self::capture_full_page) with a lease the
    /// caller already took from this stitcher's lock.
    pub fn capture_full_page_leased(&mut self, lease: CaptureLease, config: &CaptureConfig) -> Result<CompositeImage> {
        self.check_lease(&lease)?;

        notify(&*self.observer, CaptureEvent::Started { kind: CaptureKind::FullPage });
        let result = config
            .validate()
            .and_then(|()| self.check_supported())
            .and_then(|()| stitch_full_page(&mut self.surface, &self.policy, config, &*self.observer));
        let outcome = match result {
            Ok(image) => {
                notify(
                    &*self.observer,
                    CaptureEvent::Completed {
                        kind: CaptureKind::FullPage,
                        width: image.geometry.page_width,
                        height: image.geometry.page_height,
                        tiles: image.tiles,
                    },
                );
                info!(
                    "Full-page capture done: {}",
                    encode::format_size(image.encoded.bytes.len())
                );
                self.remember(&image.encoded, &image.metadata);
                Ok(image)
            }
            Err(err) => {
                warn!("Full-page capture failed: {}", err);
                notify(
                    &*self.observer,
                    CaptureEvent::Failed { kind: CaptureKind::FullPage, message: err.to_string() },
                );
                Err(err)
            }
        };
        drop(lease);
        outcome
    }

    /// Capture what is currently visible in the viewport.
    pub fn capture_viewport(&mut self) -> Result<EncodedImage> {
        let lease = self.lock.try_acquire()?;
        self.capture_viewport_leased(lease)
    }

    pub fn capture_viewport_leased(&mut self, lease: CaptureLease) -> Result<EncodedImage> {
        self.check_lease(&lease)?;
        self.single_capture(CaptureKind::Viewport, |surface| {
            let viewport = surface.viewport()?;
            let scroll = surface.scroll_position()?;
            Ok(Region::new(
                scroll.x.round() as u32,
                scroll.y.round() as u32,
                viewport.width,
                viewport.height,
            ))
        })
    }

    /// Capture the viewport, or fall back to a placeholder image if the
    /// capture itself fails. A capture already in progress is still an error.
    pub fn capture_viewport_or_placeholder(&mut self) -> Result<EncodedImage> {
        match self.capture_viewport() {
            Err(Error::CaptureInProgress) => Err(Error::CaptureInProgress),
            Err(err) => {
                warn!("Viewport capture failed, using placeholder: {}", err);
                encode::encode(&encode::placeholder(), ImageFormat::Png, SINGLE_CAPTURE_QUALITY)
            }
            ok => ok,
        }
    }

    /// Capture the first element matching `selector`.
    ///
    /// The page is scrolled so the element's top edge is at the top of the
    /// viewport; elements taller than the viewport are cut at its bottom.
    pub fn capture_element(&mut self, selector: &str) -> Result<EncodedImage> {
        if selector.trim().is_empty() {
            return Err(Error::InvalidConfig("no element specified".into()));
        }
        let lease = self.lock.try_acquire()?;
        let selector = selector.to_string();
        let res = self.single_capture(CaptureKind::Element, move |surface| {
            let rect = surface
                .element_rect(&selector)?
                .ok_or_else(|| Error::Surface(format!("no element matches '{}'", selector)))?;
            let viewport = surface.viewport()?;
            surface.scroll_to(ScrollPosition { x: 0.0, y: rect.y as f64 })?;
            surface.wait_for_paint()?;
            Ok(Region { height: rect.height.min(viewport.height), ..rect })
        });
        drop(lease);
        res
    }

    fn single_capture<F>(&mut self, kind: CaptureKind, locate: F) -> Result<EncodedImage>
    where
        F: FnOnce(&mut S) -> Result<Region>,
    {
        notify(&*self.observer, CaptureEvent::Started { kind });
        let result = self.check_supported().and_then(|()| {
            let metadata = CaptureMetadata::collect(&self.surface)?;
            let mut session = Session::begin(&mut self.surface, &self.policy)?;
            let region = locate(session.surface())?;
            let filter = CaptureFilter::viewport(&self.policy);
            let bitmap = session.surface().capture(region, &filter)?;
            let image = encode::encode(&bitmap, ImageFormat::Png, SINGLE_CAPTURE_QUALITY)?;
            Ok((image, metadata))
        });

        match result {
            Ok((image, metadata)) => {
                notify(
                    &*self.observer,
                    CaptureEvent::Completed { kind, width: image.width, height: image.height, tiles: 1 },
                );
                self.remember(&image, &metadata);
                Ok(image)
            }
            Err(err) => {
                warn!("{:?} capture failed: {}", kind, err);
                notify(&*self.observer, CaptureEvent::Failed { kind, message: err.to_string() });
                Err(err)
            }
        }
    }

    fn check_lease(&self, lease: &CaptureLease) -> Result<()> {
        if self.lock.issued(lease) {
            Ok(())
        } else {
            Err(Error::Other("capture lease was issued by a different lock".into()))
        }
    }

    fn check_supported(&self) -> Result<()> {
        if self.surface.supports_capture() {
            Ok(())
        } else {
            Err(Error::CaptureUnsupported("surface has no capture primitive".into()))
        }
    }

    fn remember(&mut self, image: &EncodedImage, metadata: &CaptureMetadata) {
        self.last = Some(LastCapture {
            image: image.clone(),
            metadata: metadata.clone(),
        });
    }
}

/// Scoped exclusive use of the surface.
///
/// Snapshots scroll position and root overflow on entry and hides the
/// feedback overlay; dropping it puts all of that back and clears the
/// fixed-element markers, on success and on error alike.
struct Session<'a, S: CaptureSurface> {
    surface: &'a mut S,
    policy: &'a MaskPolicy,
    scroll: ScrollPosition,
    overflow: OverflowStyles,
}

impl<'a, S: CaptureSurface> Session<'a, S> {
    fn begin(surface: &'a mut S, policy: &'a MaskPolicy) -> Result<Self> {
        let scroll = surface.scroll_position()?;
        let overflow = surface.overflow_styles()?;
        let session = Session { surface, policy, scroll, overflow };
        session.surface.set_overlay_visible(&policy.overlay_id, false)?;
        Ok(session)
    }

    fn surface(&mut self) -> &mut S {
        self.surface
    }
}

impl<S: CaptureSurface> Drop for Session<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.surface.scroll_to(self.scroll) {
            warn!("Failed to restore scroll position: {}", e);
        }
        if let Err(e) = self.surface.set_overflow_styles(&self.overflow) {
            warn!("Failed to restore overflow styles: {}", e);
        }
        if let Err(e) = self.surface.clear_marker(&self.policy.fixed_marker) {
            warn!("Failed to clear fixed-element markers: {}", e);
        }
        if let Err(e) = self.surface.set_overlay_visible(&self.policy.overlay_id, true) {
            warn!("Failed to show feedback overlay again: {}", e);
        }
    }
}

fn stitch_full_page<S: CaptureSurface>(
    surface: &mut S,
    policy: &MaskPolicy,
    config: &CaptureConfig,
    observer: &dyn CaptureObserver,
) -> Result<CompositeImage> {
    // taken before any scrolling, so it describes the page as the user left it
    let metadata = CaptureMetadata::collect(&*surface)?;
    let mut session = Session::begin(surface, policy)?;

    let viewport = session.surface().viewport()?;
    let metrics = session.surface().document_metrics()?;
    let geometry = PageGeometry::measure(viewport, &metrics, config.max_height)?;
    let plan = TilePlan::new(&geometry, config.overlap)?;
    info!(
        "Full-page capture: {}x{} in {} tile(s), step {}px",
        geometry.page_width,
        geometry.page_height,
        plan.len(),
        plan.step()
    );

    let filter = CaptureFilter::full_page(policy);
    let mut tiles = Vec::with_capacity(plan.len());
    for tile in &plan {
        let surface = session.surface();
        surface.scroll_to(ScrollPosition { x: 0.0, y: tile.scroll_y as f64 })?;
        surface.wait_for_paint()?;
        settle(config.scroll_delay);

        notify(observer, CaptureEvent::Progress(Progress::new(tile.index + 1, plan.len())));

        let region = Region::new(0, tile.scroll_y, geometry.page_width, tile.capture_height);
        let bitmap = surface.capture(region, &filter).map_err(|e| match e {
            Error::TileCapture { .. } => e,
            other => Error::TileCapture { index: tile.index, message: other.to_string() },
        })?;
        debug!("Tile {}/{} captured at y={}", tile.index + 1, plan.len(), tile.scroll_y);

        tiles.push(TileResult {
            bitmap,
            y: tile.scroll_y,
            height: tile.capture_height,
        });
    }

    let tile_count = tiles.len();
    let bitmap = composite(&geometry, tiles);
    let encoded = encode::encode(&bitmap, config.format, config.quality)?;

    Ok(CompositeImage {
        geometry,
        tiles: tile_count,
        bitmap,
        encoded,
        metadata,
    })
}

fn settle(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::synthetic::stripe_color;
    use crate::surface::SyntheticPage;
    use crate::Viewport;

    fn quick(overlap: u32) -> CaptureConfig {
        CaptureConfig {
            scroll_delay: Duration::ZERO,
            overlap,
            ..Default::default()
        }
    }

    #[test]
    fn composite_reproduces_the_document() {
        let page = SyntheticPage::striped(Viewport { width: 40, height: 100 }, 40, 730);
        let mut stitcher = Stitcher::new(page);
        let image = stitcher.capture_full_page(&quick(30)).unwrap();
        assert_eq!(image.tiles, 11);
        assert_eq!(image.bitmap.dimensions(), (40, 730));
        for y in [0, 69, 70, 99, 100, 500, 729] {
            assert_eq!(*image.bitmap.get_pixel(7, y), stripe_color(y), "row {}", y);
        }
        assert!(!stitcher.lock().is_busy());
        assert!(stitcher.last_capture().is_some());
    }

    #[test]
    fn one_paint_wait_per_tile() {
        let page = SyntheticPage::striped(Viewport { width: 20, height: 50 }, 20, 120);
        let mut stitcher = Stitcher::new(page);
        let image = stitcher.capture_full_page(&quick(0)).unwrap();
        assert_eq!(image.tiles, 3);
        assert_eq!(stitcher.surface().paints(), 3);
    }

    #[test]
    fn lease_from_another_lock_is_refused() {
        let page = SyntheticPage::striped(Viewport { width: 20, height: 50 }, 20, 120);
        let mut stitcher = Stitcher::new(page);
        let foreign = CaptureLock::new().try_acquire().unwrap();
        assert!(matches!(
            stitcher.capture_full_page_leased(foreign, &quick(0)),
            Err(Error::Other(_))
        ));
    }

    #[test]
    fn invalid_quality_fails_before_touching_the_page() {
        let page = SyntheticPage::striped(Viewport { width: 20, height: 50 }, 20, 120).scrolled_to(0.0, 30.0);
        let mut stitcher = Stitcher::new(page);
        let cfg = CaptureConfig { quality: 2.0, ..quick(0) };
        assert!(matches!(stitcher.capture_full_page(&cfg), Err(Error::InvalidConfig(_))));
        assert!(stitcher.surface().captures().is_empty());
        assert!(!stitcher.lock().is_busy());
    }

    #[test]
    fn last_capture_can_be_cleared() {
        let page = SyntheticPage::striped(Viewport { width: 20, height: 50 }, 20, 50);
        let mut stitcher = Stitcher::new(page);
        stitcher.capture_viewport().unwrap();
        assert_eq!(stitcher.last_capture().unwrap().image.format, ImageFormat::Png);
        stitcher.clear_last_capture();
        assert!(stitcher.last_capture().is_none());
    }

    #[test]
    fn rejected_config_is_reported_like_any_other_failure() {
        let page = SyntheticPage::striped(Viewport { width: 20, height: 50 }, 20, 120);
        let (tx, rx) = crate::events::channel();
        let mut stitcher = Stitcher::new(page).with_observer(tx);

        let cfg = CaptureConfig { quality: -0.5, ..quick(0) };
        assert!(stitcher.capture_full_page(&cfg).is_err());
        let too_much_overlap = quick(50);
        assert!(stitcher.capture_full_page(&too_much_overlap).is_err());

        let names: Vec<String> = rx.try_iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                "fullpage-capture-start",
                "fullpage-capture-error",
                "fullpage-capture-start",
                "fullpage-capture-error",
            ]
        );
    }

    #[test]
    fn composite_carries_the_page_state_from_before_scrolling() {
        let info = crate::PageInfo {
            url: Some("https://shop.test/checkout".into()),
            title: Some("Checkout".into()),
            device_pixel_ratio: 1.5,
        };
        let page = SyntheticPage::striped(Viewport { width: 20, height: 50 }, 20, 300)
            .with_page_info(info)
            .scrolled_to(0.0, 75.0);
        let mut stitcher = Stitcher::new(page);
        let image = stitcher.capture_full_page(&quick(10)).unwrap();

        assert_eq!(image.metadata.scroll_y, 75.0);
        assert_eq!((image.metadata.viewport_width, image.metadata.viewport_height), (20, 50));
        assert_eq!(image.metadata.url.as_deref(), Some("https://shop.test/checkout"));
        assert_eq!(image.metadata.device_pixel_ratio, 1.5);
        assert_eq!(stitcher.last_capture().unwrap().metadata, image.metadata);
    }
}
