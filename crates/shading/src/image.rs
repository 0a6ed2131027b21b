use std::fmt;
use std::ops::{Add, Sub};

use serde::Serialize;

use crate::error::ShadingError;
use crate::hash::DigestBuilder;

/// Edge length of the square tiles every image plane is divided into.
pub const TILE_SIZE: i32 = 64;

/// Number of pixels in one tile.
pub const fn tile_pixels() -> usize {
    (TILE_SIZE * TILE_SIZE) as usize
}

/// Integer pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct V2i {
    pub x: i32,
    pub y: i32,
}

impl V2i {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn splat(value: i32) -> Self {
        Self { x: value, y: value }
    }
}

impl Add for V2i {
    type Output = V2i;

    fn add(self, rhs: V2i) -> V2i {
        V2i::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for V2i {
    type Output = V2i;

    fn sub(self, rhs: V2i) -> V2i {
        V2i::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl fmt::Display for V2i {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Origin of the tile containing `point`. Rounds towards negative infinity so
/// that negative coordinates land on the grid as well.
pub fn tile_origin(point: V2i) -> V2i {
    V2i::new(
        point.x.div_euclid(TILE_SIZE) * TILE_SIZE,
        point.y.div_euclid(TILE_SIZE) * TILE_SIZE,
    )
}

pub fn is_tile_aligned(origin: V2i) -> bool {
    tile_origin(origin) == origin
}

pub(crate) fn ensure_tile_aligned(origin: V2i) -> Result<(), ShadingError> {
    if is_tile_aligned(origin) {
        Ok(())
    } else {
        Err(ShadingError::TileAlignment {
            x: origin.x,
            y: origin.y,
            size: TILE_SIZE,
        })
    }
}

/// Half-open pixel rectangle `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Box2i {
    pub min: V2i,
    pub max: V2i,
}

impl Box2i {
    pub const fn new(min: V2i, max: V2i) -> Self {
        Self { min, max }
    }

    pub const fn from_size(width: i32, height: i32) -> Self {
        Self {
            min: V2i::new(0, 0),
            max: V2i::new(width, height),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.max.x <= self.min.x || self.max.y <= self.min.y
    }

    pub fn width(&self) -> i32 {
        (self.max.x - self.min.x).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.max.y - self.min.y).max(0)
    }

    pub fn size(&self) -> V2i {
        V2i::new(self.width(), self.height())
    }

    pub fn contains(&self, point: V2i) -> bool {
        point.x >= self.min.x
            && point.x < self.max.x
            && point.y >= self.min.y
            && point.y < self.max.y
    }

    /// Origins of every tile overlapping this box, row-major, produced lazily.
    pub fn tile_origins(&self) -> impl Iterator<Item = V2i> {
        let (first, last) = if self.is_empty() {
            (V2i::splat(0), V2i::splat(-1))
        } else {
            (tile_origin(self.min), tile_origin(self.max - V2i::splat(1)))
        };
        let step = TILE_SIZE as usize;
        (first.y..=last.y).step_by(step).flat_map(move |y| {
            (first.x..=last.x)
                .step_by(step)
                .map(move |x| V2i::new(x, y))
        })
    }
}

/// Resolution and pixel aspect of an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Format {
    pub display_window: Box2i,
    pub pixel_aspect: f64,
}

impl Format {
    pub const fn new(width: i32, height: i32) -> Self {
        Self {
            display_window: Box2i::from_size(width, height),
            pixel_aspect: 1.0,
        }
    }

    pub fn with_display_window(display_window: Box2i) -> Self {
        Self {
            display_window,
            pixel_aspect: 1.0,
        }
    }

    pub fn width(&self) -> i32 {
        self.display_window.width()
    }

    pub fn height(&self) -> i32 {
        self.display_window.height()
    }

    pub fn hash_into(&self, builder: &mut DigestBuilder) {
        builder
            .append(&self.display_window)
            .append_f64(self.pixel_aspect);
    }
}

impl Default for Format {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width(), self.height())
    }
}
