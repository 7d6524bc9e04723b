use std::path::Path;

use image::{DynamicImage, ImageReader, RgbaImage};

use crate::error::LoadError;

/// Red channel must exceed this for a collision-map pixel to count as solid.
pub const SOLID_RED_MIN_EXCLUSIVE: u8 = 200;
/// Green and blue channels must stay below this for a pixel to count as solid.
pub const SOLID_GREEN_BLUE_MAX_EXCLUSIVE: u8 = 10;

const OCCUPIED: u8 = 1;
const CLEAR: u8 = 0;

/// Binary occupancy grid derived from a collision map image.
///
/// Index convention: `occupancy[y * width + x]`, `(0, 0)` is the top-left pixel.
/// Anything outside `[0, width) x [0, height)` reads as occupied so the map edge
/// behaves like a wall. A grid is never mutated after construction; loading a new
/// map replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionGrid {
    width: u32,
    height: u32,
    occupancy: Vec<u8>,
}

impl CollisionGrid {
    pub fn from_occupancy(width: u32, height: u32, occupancy: Vec<u8>) -> Result<Self, LoadError> {
        let expected = width as usize * height as usize;
        let actual = occupancy.len();
        if expected != actual {
            return Err(LoadError::OccupancyLength { expected, actual });
        }
        let occupancy = occupancy
            .into_iter()
            .map(|cell| if cell == CLEAR { CLEAR } else { OCCUPIED })
            .collect();
        Ok(Self {
            width,
            height,
            occupancy,
        })
    }

    /// Grid with no solid pixels; only the outer edge blocks movement.
    pub fn open_field(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            occupancy: vec![CLEAR; width as usize * height as usize],
        }
    }

    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Result<Self, LoadError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(LoadError::PixelBufferLength {
                expected,
                actual: rgba.len(),
            });
        }
        let occupancy = rgba
            .chunks_exact(4)
            .map(|px| {
                if is_solid_color(px[0], px[1], px[2]) {
                    OCCUPIED
                } else {
                    CLEAR
                }
            })
            .collect();
        Ok(Self {
            width,
            height,
            occupancy,
        })
    }

    pub fn from_rgba_image(image: &RgbaImage) -> Self {
        let occupancy = image
            .pixels()
            .map(|px| {
                let [red, green, blue, _] = px.0;
                if is_solid_color(red, green, blue) {
                    OCCUPIED
                } else {
                    CLEAR
                }
            })
            .collect();
        Self {
            width: image.width(),
            height: image.height(),
            occupancy,
        }
    }

    pub fn from_image(image: &DynamicImage) -> Self {
        Self::from_rgba_image(&image.to_rgba8())
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let reader = ImageReader::open(path).map_err(|source| LoadError::OpenImage {
            path: path.to_path_buf(),
            source,
        })?;
        let decoded = reader.decode().map_err(|source| LoadError::DecodeImage {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_image(&decoded))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn solid_count(&self) -> usize {
        self.occupancy
            .iter()
            .filter(|cell| **cell == OCCUPIED)
            .count()
    }

    pub fn point_occupied(&self, x: f32, y: f32) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return true;
        }
        self.cell_occupied(x.floor() as i64, y.floor() as i64)
    }

    /// Perimeter-only test: the four edges of the rectangle are sampled, the
    /// interior is not. A solid region strictly inside the rectangle that never
    /// touches its border goes undetected; colliders are expected to be smaller
    /// than obstacles.
    ///
    /// The rectangle `[x, x + w) x [y, y + h)` covers pixel columns
    /// `floor(x) ..= ceil(x + w) - 1` (rows likewise); a zero-sized rectangle
    /// degenerates to the point `(x, y)`. Spans are clamped to one pixel
    /// outside the grid, which reads the same as anything further out.
    pub fn rect_occupied(&self, x: f32, y: f32, w: f32, h: f32) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return true;
        }
        let (x0, x1) = pixel_span(x, w, self.width);
        let (y0, y1) = pixel_span(y, h, self.height);

        for px in x0..=x1 {
            if self.cell_occupied(px, y0) || self.cell_occupied(px, y1) {
                return true;
            }
        }
        for py in y0..=y1 {
            if self.cell_occupied(x0, py) || self.cell_occupied(x1, py) {
                return true;
            }
        }
        false
    }

    /// Every solid pixel inside the rectangle, clamped to the grid. Debug
    /// visualization only; evaluated lazily.
    pub fn pixels_in_area(
        &self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) -> impl Iterator<Item = (u32, u32)> + '_ {
        let (x0, x1) = self.clamp_span(x, w, self.width);
        let (y0, y1) = self.clamp_span(y, h, self.height);
        (y0..y1).flat_map(move |py| {
            (x0..x1)
                .filter(move |px| self.occupancy[self.index(*px, py)] == OCCUPIED)
                .map(move |px| (px, py))
        })
    }

    fn cell_occupied(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return true;
        }
        self.occupancy[self.index(x as u32, y as u32)] == OCCUPIED
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn clamp_span(&self, start: f32, extent: f32, limit: u32) -> (u32, u32) {
        if !start.is_finite() || !extent.is_finite() {
            return (0, 0);
        }
        let lo = start.floor().clamp(0.0, limit as f32) as u32;
        let hi = (start + extent.max(0.0)).ceil().clamp(0.0, limit as f32) as u32;
        (lo, hi.max(lo))
    }
}

pub fn is_solid_color(red: u8, green: u8, blue: u8) -> bool {
    red > SOLID_RED_MIN_EXCLUSIVE
        && green < SOLID_GREEN_BLUE_MAX_EXCLUSIVE
        && blue < SOLID_GREEN_BLUE_MAX_EXCLUSIVE
}

fn pixel_span(start: f32, extent: f32, limit: u32) -> (i64, i64) {
    let extent = if extent.is_finite() {
        extent.max(0.0)
    } else {
        0.0
    };
    let clamp = |edge: f32| edge.clamp(-1.0, limit as f32) as i64;
    let first = clamp(start.floor());
    let last = clamp((start + extent).ceil() - 1.0);
    (first, last.max(first))
}
