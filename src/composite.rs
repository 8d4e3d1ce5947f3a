//! Reassembling tiles into a single page bitmap

use crate::encode::EncodedImage;
use crate::geometry::PageGeometry;
use crate::metadata::CaptureMetadata;
use image::imageops;
use image::{Rgba, RgbaImage};
use sha2::{Digest, Sha256};

/// One raw capture, drawn at document offset `y`.
#[derive(Debug, Clone)]
pub struct TileResult {
    pub bitmap: RgbaImage,
    pub y: u32,
    /// Planned height of the tile; may be less than the bitmap's height
    pub height: u32,
}

/// The stitched page
#[derive(Debug, Clone)]
pub struct CompositeImage {
    pub geometry: PageGeometry,
    /// Number of tiles the page was assembled from
    pub tiles: usize,
    pub bitmap: RgbaImage,
    pub encoded: EncodedImage,
    /// Page state when the capture started
    pub metadata: CaptureMetadata,
}

impl CompositeImage {
    /// Hex SHA-256 of the raw RGBA pixels, for golden comparisons.
    pub fn pixel_digest(&self) -> String {
        hex::encode(Sha256::digest(self.bitmap.as_raw()))
    }
}

/// Draw `tiles` in order onto a white `page_width × page_height` canvas.
///
/// Each tile lands at its own `y`; later tiles overwrite the overlap of
/// earlier ones without blending. A tile is cropped to its planned height
/// and to whatever remains of the page below `y`.
pub fn composite(geometry: &PageGeometry, tiles: Vec<TileResult>) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(
        geometry.page_width,
        geometry.page_height,
        Rgba([255, 255, 255, 255]),
    );

    for tile in tiles {
        if tile.y >= geometry.page_height {
            continue;
        }
        let remaining = geometry.page_height - tile.y;
        let rows = tile.height.min(remaining).min(tile.bitmap.height());
        let cols = tile.bitmap.width().min(geometry.page_width);
        if rows == 0 || cols == 0 {
            continue;
        }
        let visible = imageops::crop_imm(&tile.bitmap, 0, 0, cols, rows).to_image();
        imageops::replace(&mut canvas, &visible, 0, tile.y as i64);
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn geometry(page_width: u32, page_height: u32) -> PageGeometry {
        PageGeometry {
            viewport_width: page_width,
            viewport_height: 10,
            page_width,
            page_height,
        }
    }

    fn solid(w: u32, h: u32, v: u8) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([v, v, v, 255]))
    }

    #[test]
    fn later_tiles_overwrite_overlap() {
        let g = geometry(4, 16);
        let tiles = vec![
            TileResult { bitmap: solid(4, 10, 1), y: 0, height: 10 },
            TileResult { bitmap: solid(4, 10, 2), y: 8, height: 8 },
        ];
        let out = composite(&g, tiles);
        assert_eq!(out.dimensions(), (4, 16));
        assert_eq!(out.get_pixel(0, 7).0[0], 1);
        assert_eq!(out.get_pixel(0, 8).0[0], 2);
        assert_eq!(out.get_pixel(3, 15).0[0], 2);
    }

    #[test]
    fn last_tile_is_source_cropped() {
        let g = geometry(4, 12);
        // the primitive returned a full viewport even though only 2 rows remain
        let tiles = vec![
            TileResult { bitmap: solid(4, 10, 1), y: 0, height: 10 },
            TileResult { bitmap: solid(4, 10, 2), y: 10, height: 2 },
        ];
        let out = composite(&g, tiles);
        assert_eq!(out.height(), 12);
        assert_eq!(out.get_pixel(0, 11).0[0], 2);
    }

    #[test]
    fn gaps_stay_opaque_white() {
        let g = geometry(6, 20);
        let tiles = vec![TileResult { bitmap: solid(3, 5, 9), y: 0, height: 5 }];
        let out = composite(&g, tiles);
        assert_eq!(*out.get_pixel(5, 0), WHITE);
        assert_eq!(*out.get_pixel(0, 19), WHITE);
        assert_eq!(out.get_pixel(2, 4).0[0], 9);
    }

    #[test]
    fn tiles_wider_than_the_page_are_clipped() {
        let g = geometry(4, 5);
        let tiles = vec![TileResult { bitmap: solid(10, 5, 3), y: 0, height: 5 }];
        let out = composite(&g, tiles);
        assert_eq!(out.dimensions(), (4, 5));
        assert_eq!(out.get_pixel(3, 4).0[0], 3);
    }
}
