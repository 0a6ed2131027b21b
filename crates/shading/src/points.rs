//! Builds the point set a shading engine is evaluated against for one tile.
//!
//! Every pixel of the tile contributes one point in flat mode, or one point
//! per sample in deep mode. Points are ordered row-major by pixel and then by
//! sample index. Each carries:
//!
//! - `P`: the pixel centre, with the sample index as `z` for deep images.
//! - `u`, `v`: the pixel centre normalised against the display window.
//! - any upstream channel the engine declared it needs, under its own name.
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use crate::context::Context;
use crate::engine::ShadingEngine;
use crate::error::ShadingError;
use crate::image::{ensure_tile_aligned, Box2i, V2i, TILE_SIZE};
use crate::source::ImageSource;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadingPoints {
    pub p: Vec<[f32; 3]>,
    pub u: Vec<f32>,
    pub v: Vec<f32>,
    attributes: BTreeMap<String, Arc<Vec<f32>>>,
}

impl ShadingPoints {
    fn with_capacity(count: usize) -> Self {
        Self {
            p: Vec::with_capacity(count),
            u: Vec::with_capacity(count),
            v: Vec::with_capacity(count),
            attributes: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.p.len()
    }

    pub fn is_empty(&self) -> bool {
        self.p.is_empty()
    }

    pub fn attribute(&self, name: &str) -> Option<&[f32]> {
        self.attributes.get(name).map(|data| data.as_slice())
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn insert_attribute(
        &mut self,
        name: impl Into<String>,
        data: Arc<Vec<f32>>,
    ) -> Result<(), ShadingError> {
        let name = name.into();
        if data.len() != self.len() {
            return Err(ShadingError::AttributeLength {
                name,
                expected: self.len(),
                actual: data.len(),
            });
        }
        self.attributes.insert(name, data);
        Ok(())
    }

    fn push(&mut self, p: [f32; 3], u: f32, v: f32) {
        self.p.push(p);
        self.u.push(u);
        self.v.push(v);
    }
}

/// Maps pixel coordinates to UVs so that pixel centres of the display window
/// span `(0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvMapping {
    pub origin: [f32; 2],
    pub step: [f32; 2],
}

impl UvMapping {
    pub fn from_display_window(display_window: &Box2i) -> Self {
        let step = [
            1.0 / display_window.width() as f32,
            1.0 / display_window.height() as f32,
        ];
        Self {
            origin: [
                (0.5 - display_window.min.x as f32) * step[0],
                (0.5 - display_window.min.y as f32) * step[1],
            ],
            step,
        }
    }

    pub fn u(&self, x: i32) -> f32 {
        self.origin[0] + x as f32 * self.step[0]
    }

    pub fn v(&self, y: i32) -> f32 {
        self.origin[1] + y as f32 * self.step[1]
    }
}

/// Points for every pixel of a flat tile of `tile_size`×`tile_size` pixels.
pub fn flat_points(tile_origin: V2i, tile_size: i32, uv: &UvMapping) -> ShadingPoints {
    let mut points = ShadingPoints::with_capacity((tile_size * tile_size).max(0) as usize);
    for y in tile_origin.y..tile_origin.y + tile_size {
        let v = uv.v(y);
        for x in tile_origin.x..tile_origin.x + tile_size {
            points.push([x as f32 + 0.5, y as f32 + 0.5, 0.0], uv.u(x), v);
        }
    }
    points
}

/// Points for every sample of a deep tile, given its cumulative per-pixel
/// sample offsets.
pub fn deep_points(
    tile_origin: V2i,
    tile_size: i32,
    uv: &UvMapping,
    offsets: &[i32],
) -> Result<ShadingPoints, ShadingError> {
    validate_offsets(tile_origin, tile_size, offsets)?;

    let total = offsets.last().copied().unwrap_or(0) as usize;
    let mut points = ShadingPoints::with_capacity(total);
    let mut previous = 0;
    let mut index = 0;
    for y in tile_origin.y..tile_origin.y + tile_size {
        let v = uv.v(y);
        for x in tile_origin.x..tile_origin.x + tile_size {
            let offset = offsets[index];
            for sample in 0..offset - previous {
                points.push([x as f32 + 0.5, y as f32 + 0.5, sample as f32], uv.u(x), v);
            }
            previous = offset;
            index += 1;
        }
    }
    Ok(points)
}

fn validate_offsets(
    tile_origin: V2i,
    tile_size: i32,
    offsets: &[i32],
) -> Result<(), ShadingError> {
    let malformed = |reason: String| ShadingError::MalformedOffsets {
        x: tile_origin.x,
        y: tile_origin.y,
        reason,
    };

    let expected = (tile_size * tile_size).max(0) as usize;
    if offsets.len() != expected {
        return Err(malformed(format!(
            "expected {expected} entries, found {}",
            offsets.len()
        )));
    }

    let mut previous = 0;
    for (index, offset) in offsets.iter().enumerate() {
        if *offset < previous {
            return Err(malformed(format!(
                "offset {offset} at pixel {index} is lower than the preceding {previous}"
            )));
        }
        previous = *offset;
    }
    Ok(())
}

/// Builds the point set for one tile of `source`, attaching only the upstream
/// channels `engine` needs.
pub fn build_points(
    source: &dyn ImageSource,
    engine: &dyn ShadingEngine,
    tile_origin: V2i,
    context: &Context,
) -> Result<ShadingPoints, ShadingError> {
    ensure_tile_aligned(tile_origin)?;

    let format = source.format(context)?;
    let channel_names = source.channel_names(context)?;
    let deep = source.deep(context)?;
    let uv = UvMapping::from_display_window(&format.display_window);

    let mut points = if deep {
        let offsets = source.sample_offsets(tile_origin, context)?;
        deep_points(tile_origin, TILE_SIZE, &uv, &offsets)?
    } else {
        flat_points(tile_origin, TILE_SIZE, &uv)
    };

    for channel in channel_names.iter() {
        if !engine.needs_attribute(channel) {
            continue;
        }
        let data = source.channel_data(channel, tile_origin, context)?;
        points.insert_attribute(channel.clone(), data)?;
    }

    trace!(
        tile = %tile_origin,
        deep,
        points = points.len(),
        attributes = points.attributes.len(),
        "built shading points"
    );
    Ok(points)
}
