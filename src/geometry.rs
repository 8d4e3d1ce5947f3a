//! Page measurement and the vertical tiling plan

use crate::{Error, Result, Viewport};

/// Size metrics of one of the two root boxes (`<body>` or `<html>`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoxMetrics {
    pub scroll_width: u32,
    pub scroll_height: u32,
    pub offset_width: u32,
    pub offset_height: u32,
    pub client_width: u32,
    pub client_height: u32,
}

impl BoxMetrics {
    /// Metrics of a box whose scroll, offset and client sizes all agree.
    pub fn uniform(width: u32, height: u32) -> Self {
        Self {
            scroll_width: width,
            scroll_height: height,
            offset_width: width,
            offset_height: height,
            client_width: width,
            client_height: height,
        }
    }

    fn max_width(&self) -> u32 {
        self.scroll_width.max(self.offset_width).max(self.client_width)
    }

    fn max_height(&self) -> u32 {
        self.scroll_height.max(self.offset_height).max(self.client_height)
    }
}

/// The size sources a document exposes for its total extent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentMetrics {
    pub body: BoxMetrics,
    pub root: BoxMetrics,
}

/// Page and viewport dimensions, measured once at capture start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageGeometry {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub page_width: u32,
    /// Already clamped to `max_height`
    pub page_height: u32,
}

impl PageGeometry {
    /// Combine the viewport with the document's size sources.
    ///
    /// The width is the largest reported width (never narrower than the
    /// viewport) and is not clamped; the height is the largest reported
    /// height clamped to `max_height`.
    pub fn measure(viewport: Viewport, metrics: &DocumentMetrics, max_height: u32) -> Result<Self> {
        if viewport.width == 0 || viewport.height == 0 {
            return Err(Error::Surface(format!(
                "viewport has no area ({}x{})",
                viewport.width, viewport.height
            )));
        }

        let page_width = metrics
            .body
            .max_width()
            .max(metrics.root.max_width())
            .max(viewport.width);
        let page_height = metrics
            .body
            .max_height()
            .max(metrics.root.max_height())
            .min(max_height);

        if page_height == 0 {
            return Err(Error::Surface("document has zero height".into()));
        }

        Ok(Self {
            viewport_width: viewport.width,
            viewport_height: viewport.height,
            page_width,
            page_height,
        })
    }
}

/// One viewport-sized capture at a given scroll offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub index: usize,
    pub scroll_y: u32,
    pub capture_height: u32,
}

/// Ordered tiles covering `[0, page_height)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePlan {
    step: u32,
    tiles: Vec<Tile>,
}

impl TilePlan {
    /// Build the plan for `geometry` with consecutive tiles `overlap` pixels apart.
    ///
    /// An overlap that leaves no positive scroll step is rejected rather
    /// than clamped.
    pub fn new(geometry: &PageGeometry, overlap: u32) -> Result<Self> {
        let viewport_height = geometry.viewport_height;
        if overlap >= viewport_height {
            return Err(Error::InvalidConfig(format!(
                "overlap ({}px) must be smaller than the viewport height ({}px)",
                overlap, viewport_height
            )));
        }
        let step = viewport_height - overlap;
        let page_height = geometry.page_height;
        // a page that fits in the viewport is one capture whatever the overlap
        let count = if page_height <= viewport_height {
            1
        } else {
            page_height.div_ceil(step) as usize
        };

        let tiles = (0..count)
            .map(|index| {
                let scroll_y = index as u32 * step;
                Tile {
                    index,
                    scroll_y,
                    capture_height: (page_height - scroll_y).min(viewport_height),
                }
            })
            .collect();

        Ok(Self { step, tiles })
    }

    /// Vertical distance between consecutive tiles.
    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tile> {
        self.tiles.iter()
    }
}

impl<'a> IntoIterator for &'a TilePlan {
    type Item = &'a Tile;
    type IntoIter = std::slice::Iter<'a, Tile>;

    fn into_iter(self) -> Self::IntoIter {
        self.tiles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(viewport_height: u32, page_height: u32) -> PageGeometry {
        PageGeometry {
            viewport_width: 1024,
            viewport_height,
            page_width: 1024,
            page_height,
        }
    }

    #[test]
    fn plan_for_overlapping_tiles() {
        let plan = TilePlan::new(&geometry(800, 2300), 100).unwrap();
        assert_eq!(plan.step(), 700);
        assert_eq!(plan.len(), 4);
        let ys: Vec<u32> = plan.iter().map(|t| t.scroll_y).collect();
        assert_eq!(ys, vec![0, 700, 1400, 2100]);
        let heights: Vec<u32> = plan.iter().map(|t| t.capture_height).collect();
        assert_eq!(heights, vec![800, 800, 800, 200]);
    }

    #[test]
    fn page_fitting_in_viewport_is_one_tile() {
        let plan = TilePlan::new(&geometry(800, 800), 100).unwrap();
        assert_eq!(plan.tiles(), &[Tile { index: 0, scroll_y: 0, capture_height: 800 }]);

        let plan = TilePlan::new(&geometry(800, 300), 0).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.tiles()[0].capture_height, 300);

        let plan = TilePlan::new(&geometry(800, 800), 50).unwrap();
        assert_eq!(plan.len(), 1);

        // one pixel taller than the viewport needs a second tile
        let plan = TilePlan::new(&geometry(800, 801), 50).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.tiles()[1], Tile { index: 1, scroll_y: 750, capture_height: 51 });
    }

    #[test]
    fn zero_overlap_tiles_do_not_overlap() {
        let plan = TilePlan::new(&geometry(500, 1200), 0).unwrap();
        assert_eq!(plan.step(), 500);
        let tiles = plan.tiles();
        assert_eq!(tiles.len(), 3);
        for pair in tiles.windows(2) {
            assert_eq!(pair[0].scroll_y + pair[0].capture_height, pair[1].scroll_y);
        }
        assert_eq!(tiles[2].capture_height, 200);
    }

    #[test]
    fn overlap_at_or_above_viewport_is_rejected() {
        assert!(matches!(
            TilePlan::new(&geometry(800, 2300), 800),
            Err(Error::InvalidConfig(_))
        ));
        assert!(TilePlan::new(&geometry(800, 2300), 5000).is_err());
        // the largest accepted overlap still makes progress one pixel at a time
        let plan = TilePlan::new(&geometry(800, 805), 799).unwrap();
        assert_eq!(plan.step(), 1);
        assert_eq!(plan.len(), 805);
        assert_eq!(plan.tiles()[804].capture_height, 1);
    }

    #[test]
    fn tile_count_and_last_height_follow_the_step() {
        for (vh, overlap, ph) in [(720, 50, 10_000), (600, 0, 599), (600, 0, 601), (900, 300, 30_000)] {
            let plan = TilePlan::new(&geometry(vh, ph), overlap).unwrap();
            let step = vh - overlap;
            let expected = ((ph + step - 1) / step) as usize;
            assert_eq!(plan.len(), expected);
            let last = plan.tiles().last().unwrap();
            assert_eq!(last.capture_height, ph - (expected as u32 - 1) * step);
            assert!(last.scroll_y + last.capture_height <= ph);
        }
    }

    #[test]
    fn measure_takes_the_largest_source_and_clamps_height() {
        let metrics = DocumentMetrics {
            body: BoxMetrics { scroll_width: 900, scroll_height: 4000, ..Default::default() },
            root: BoxMetrics { offset_width: 1500, client_height: 700, ..Default::default() },
        };
        let vp = Viewport { width: 1280, height: 700 };
        let g = PageGeometry::measure(vp, &metrics, 30000).unwrap();
        assert_eq!(g.page_width, 1500);
        assert_eq!(g.page_height, 4000);

        let g = PageGeometry::measure(vp, &metrics, 2500).unwrap();
        assert_eq!(g.page_height, 2500);
    }

    #[test]
    fn narrow_document_is_widened_to_viewport() {
        let metrics = DocumentMetrics {
            body: BoxMetrics::uniform(400, 600),
            root: BoxMetrics::uniform(400, 600),
        };
        let g = PageGeometry::measure(Viewport { width: 1024, height: 768 }, &metrics, 30000).unwrap();
        assert_eq!(g.page_width, 1024);
        assert_eq!(g.page_height, 600);
    }

    #[test]
    fn empty_document_or_viewport_is_an_error() {
        let metrics = DocumentMetrics::default();
        assert!(PageGeometry::measure(Viewport::default(), &metrics, 30000).is_err());
        let metrics = DocumentMetrics { body: BoxMetrics::uniform(10, 10), root: BoxMetrics::default() };
        assert!(PageGeometry::measure(Viewport { width: 0, height: 10 }, &metrics, 30000).is_err());
    }
}
