//! Upstream image interface consumed by the shading node, plus two in-memory
//! implementations.
//!
//! Every query is a pure function of its arguments for a fixed upstream
//! state. The digest methods default to hashing the data they describe;
//! sources that can identify their content more cheaply override them.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::context::Context;
use crate::error::ShadingError;
use crate::hash::{digest_of, digest_of_floats, Digest, DigestBuilder};
use crate::image::{ensure_tile_aligned, tile_pixels, Box2i, Format, V2i};

pub trait ImageSource: Send + Sync {
    fn format(&self, context: &Context) -> Result<Format, ShadingError>;

    fn data_window(&self, context: &Context) -> Result<Box2i, ShadingError>;

    fn channel_names(&self, context: &Context) -> Result<Arc<Vec<String>>, ShadingError>;

    fn deep(&self, context: &Context) -> Result<bool, ShadingError>;

    /// Cumulative sample counts for each pixel of the tile, `tile_pixels()`
    /// entries long. Flat images report one sample per pixel.
    fn sample_offsets(
        &self,
        tile_origin: V2i,
        context: &Context,
    ) -> Result<Arc<Vec<i32>>, ShadingError>;

    fn channel_data(
        &self,
        channel: &str,
        tile_origin: V2i,
        context: &Context,
    ) -> Result<Arc<Vec<f32>>, ShadingError>;

    fn format_hash(&self, context: &Context) -> Result<Digest, ShadingError> {
        let mut builder = DigestBuilder::new();
        self.format(context)?.hash_into(&mut builder);
        Ok(builder.finish())
    }

    fn data_window_hash(&self, context: &Context) -> Result<Digest, ShadingError> {
        Ok(digest_of(&self.data_window(context)?))
    }

    fn channel_names_hash(&self, context: &Context) -> Result<Digest, ShadingError> {
        Ok(digest_of(self.channel_names(context)?.as_slice()))
    }

    fn sample_offsets_hash(
        &self,
        tile_origin: V2i,
        context: &Context,
    ) -> Result<Digest, ShadingError> {
        Ok(digest_of(
            self.sample_offsets(tile_origin, context)?.as_slice(),
        ))
    }

    fn channel_data_hash(
        &self,
        channel: &str,
        tile_origin: V2i,
        context: &Context,
    ) -> Result<Digest, ShadingError> {
        Ok(digest_of_floats(
            &self.channel_data(channel, tile_origin, context)?,
        ))
    }
}

/// Offsets table for a flat tile: one sample per pixel.
pub fn flat_sample_offsets() -> Vec<i32> {
    (1..=tile_pixels() as i32).collect()
}

/// Largest per-pixel sample count whose tile offsets still fit in `i32`.
pub const MAX_DEEP_SAMPLES: u32 = i32::MAX as u32 / tile_pixels() as u32;

/// An image whose channels hold the same value at every pixel.
#[derive(Debug, Clone)]
pub struct ConstantImage {
    format: Format,
    channels: Vec<(String, f32)>,
    deep_samples: Option<u32>,
}

impl ConstantImage {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            channels: Vec::new(),
            deep_samples: None,
        }
    }

    /// Opaque black RGBA, used in place of an unconnected input.
    pub fn black(format: Format) -> Self {
        Self::new(format)
            .with_channel("R", 0.0)
            .with_channel("G", 0.0)
            .with_channel("B", 0.0)
            .with_channel("A", 1.0)
    }

    pub fn with_channel(mut self, name: impl Into<String>, value: f32) -> Self {
        let name = name.into();
        match self.channels.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.channels.push((name, value)),
        }
        self
    }

    /// Makes the image deep, with `samples` samples in every pixel.
    pub fn with_deep_samples(mut self, samples: u32) -> Self {
        self.deep_samples = Some(samples);
        self
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    pub fn channel_value(&self, name: &str) -> Option<f32> {
        self.channels
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| *value)
    }

    fn samples_per_pixel(&self) -> Result<i32, ShadingError> {
        let samples = self.deep_samples.unwrap_or(1);
        i32::try_from(samples)
            .ok()
            .filter(|per_pixel| per_pixel.checked_mul(tile_pixels() as i32).is_some())
            .ok_or(ShadingError::SampleCount {
                samples,
                max: MAX_DEEP_SAMPLES,
            })
    }
}

impl ImageSource for ConstantImage {
    fn format(&self, _context: &Context) -> Result<Format, ShadingError> {
        Ok(self.format)
    }

    fn data_window(&self, _context: &Context) -> Result<Box2i, ShadingError> {
        Ok(self.format.display_window)
    }

    fn channel_names(&self, _context: &Context) -> Result<Arc<Vec<String>>, ShadingError> {
        Ok(Arc::new(
            self.channels.iter().map(|(name, _)| name.clone()).collect(),
        ))
    }

    fn deep(&self, _context: &Context) -> Result<bool, ShadingError> {
        Ok(self.deep_samples.is_some())
    }

    fn sample_offsets(
        &self,
        tile_origin: V2i,
        _context: &Context,
    ) -> Result<Arc<Vec<i32>>, ShadingError> {
        ensure_tile_aligned(tile_origin)?;
        let per_pixel = self.samples_per_pixel()?;
        Ok(Arc::new(
            (1..=tile_pixels() as i32).map(|i| i * per_pixel).collect(),
        ))
    }

    fn channel_data(
        &self,
        channel: &str,
        tile_origin: V2i,
        _context: &Context,
    ) -> Result<Arc<Vec<f32>>, ShadingError> {
        ensure_tile_aligned(tile_origin)?;
        let value = self
            .channel_value(channel)
            .ok_or_else(|| ShadingError::MissingChannel(channel.to_string()))?;
        let per_pixel = self.samples_per_pixel()?;
        Ok(Arc::new(vec![value; tile_pixels() * per_pixel as usize]))
    }

    fn sample_offsets_hash(
        &self,
        tile_origin: V2i,
        _context: &Context,
    ) -> Result<Digest, ShadingError> {
        ensure_tile_aligned(tile_origin)?;
        Ok(digest_of(&("constant-offsets", self.samples_per_pixel()?)))
    }

    fn channel_data_hash(
        &self,
        channel: &str,
        tile_origin: V2i,
        _context: &Context,
    ) -> Result<Digest, ShadingError> {
        ensure_tile_aligned(tile_origin)?;
        let value = self
            .channel_value(channel)
            .ok_or_else(|| ShadingError::MissingChannel(channel.to_string()))?;
        let mut builder = DigestBuilder::new();
        builder
            .append("constant")
            .append(channel)
            .append_f32(value)
            .append(&self.samples_per_pixel()?);
        Ok(builder.finish())
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryTile {
    channels: BTreeMap<String, Arc<Vec<f32>>>,
    sample_offsets: Option<Arc<Vec<i32>>>,
}

/// An image held entirely in memory as explicit per-tile data.
///
/// Tiles that were never written read as zero-filled, with one sample per
/// pixel for flat images and no samples for deep ones.
#[derive(Debug, Clone)]
pub struct MemoryImage {
    format: Format,
    data_window: Box2i,
    channel_names: Arc<Vec<String>>,
    deep: bool,
    tiles: HashMap<V2i, MemoryTile>,
}

impl MemoryImage {
    pub fn new(format: Format, channel_names: Vec<String>) -> Self {
        Self {
            format,
            data_window: format.display_window,
            channel_names: Arc::new(channel_names),
            deep: false,
            tiles: HashMap::new(),
        }
    }

    pub fn deep(format: Format, channel_names: Vec<String>) -> Self {
        Self {
            deep: true,
            ..Self::new(format, channel_names)
        }
    }

    pub fn set_data_window(&mut self, data_window: Box2i) {
        self.data_window = data_window;
    }

    pub fn set_sample_offsets(
        &mut self,
        tile_origin: V2i,
        offsets: Vec<i32>,
    ) -> Result<(), ShadingError> {
        ensure_tile_aligned(tile_origin)?;
        self.tiles.entry(tile_origin).or_default().sample_offsets = Some(Arc::new(offsets));
        Ok(())
    }

    pub fn set_channel_data(
        &mut self,
        channel: &str,
        tile_origin: V2i,
        data: Vec<f32>,
    ) -> Result<(), ShadingError> {
        ensure_tile_aligned(tile_origin)?;
        if !self.channel_names.iter().any(|name| name == channel) {
            return Err(ShadingError::MissingChannel(channel.to_string()));
        }
        self.tiles
            .entry(tile_origin)
            .or_default()
            .channels
            .insert(channel.to_string(), Arc::new(data));
        Ok(())
    }

    fn sample_count(&self, tile_origin: V2i) -> usize {
        match self
            .tiles
            .get(&tile_origin)
            .and_then(|tile| tile.sample_offsets.as_ref())
        {
            Some(offsets) => offsets.last().copied().unwrap_or(0).max(0) as usize,
            None if self.deep => 0,
            None => tile_pixels(),
        }
    }
}

impl ImageSource for MemoryImage {
    fn format(&self, _context: &Context) -> Result<Format, ShadingError> {
        Ok(self.format)
    }

    fn data_window(&self, _context: &Context) -> Result<Box2i, ShadingError> {
        Ok(self.data_window)
    }

    fn channel_names(&self, _context: &Context) -> Result<Arc<Vec<String>>, ShadingError> {
        Ok(Arc::clone(&self.channel_names))
    }

    fn deep(&self, _context: &Context) -> Result<bool, ShadingError> {
        Ok(self.deep)
    }

    fn sample_offsets(
        &self,
        tile_origin: V2i,
        _context: &Context,
    ) -> Result<Arc<Vec<i32>>, ShadingError> {
        ensure_tile_aligned(tile_origin)?;
        if let Some(offsets) = self
            .tiles
            .get(&tile_origin)
            .and_then(|tile| tile.sample_offsets.as_ref())
        {
            return Ok(Arc::clone(offsets));
        }
        if self.deep {
            Ok(Arc::new(vec![0; tile_pixels()]))
        } else {
            Ok(Arc::new(flat_sample_offsets()))
        }
    }

    fn channel_data(
        &self,
        channel: &str,
        tile_origin: V2i,
        _context: &Context,
    ) -> Result<Arc<Vec<f32>>, ShadingError> {
        ensure_tile_aligned(tile_origin)?;
        if !self.channel_names.iter().any(|name| name == channel) {
            return Err(ShadingError::MissingChannel(channel.to_string()));
        }
        if let Some(data) = self
            .tiles
            .get(&tile_origin)
            .and_then(|tile| tile.channels.get(channel))
        {
            return Ok(Arc::clone(data));
        }
        Ok(Arc::new(vec![0.0; self.sample_count(tile_origin)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_image_fills_tiles() {
        let image = ConstantImage::black(Format::new(100, 50));
        let context = Context::new();
        let alpha = image
            .channel_data("A", V2i::new(64, 0), &context)
            .unwrap();
        assert_eq!(alpha.len(), tile_pixels());
        assert!(alpha.iter().all(|value| *value == 1.0));
        assert_eq!(
            image.channel_names(&context).unwrap().as_slice(),
            ["R", "G", "B", "A"]
        );
    }

    #[test]
    fn constant_deep_offsets_accumulate() {
        let image = ConstantImage::new(Format::new(64, 64))
            .with_channel("Z", 2.0)
            .with_deep_samples(3);
        let context = Context::new();
        let offsets = image.sample_offsets(V2i::new(0, 0), &context).unwrap();
        assert_eq!(offsets[0], 3);
        assert_eq!(*offsets.last().unwrap() as usize, tile_pixels() * 3);
        let data = image.channel_data("Z", V2i::new(0, 0), &context).unwrap();
        assert_eq!(data.len(), tile_pixels() * 3);
    }

    #[test]
    fn oversized_deep_sample_counts_are_errors() {
        let image = ConstantImage::new(Format::new(64, 64))
            .with_channel("Z", 1.0)
            .with_deep_samples(600_000);
        let context = Context::new();
        let origin = V2i::new(0, 0);
        assert!(matches!(
            image.sample_offsets(origin, &context),
            Err(ShadingError::SampleCount { samples: 600_000, max }) if max == MAX_DEEP_SAMPLES
        ));
        assert!(matches!(
            image.channel_data("Z", origin, &context),
            Err(ShadingError::SampleCount { .. })
        ));
        assert!(image.sample_offsets_hash(origin, &context).is_err());

        let widest = ConstantImage::new(Format::new(64, 64)).with_deep_samples(MAX_DEEP_SAMPLES);
        let offsets = widest.sample_offsets(origin, &context).unwrap();
        assert_eq!(*offsets.last().unwrap() as u32, MAX_DEEP_SAMPLES * tile_pixels() as u32);
    }

    #[test]
    fn rejects_unaligned_and_unknown_requests() {
        let image = ConstantImage::black(Format::new(64, 64));
        let context = Context::new();
        assert!(matches!(
            image.channel_data("R", V2i::new(3, 0), &context),
            Err(ShadingError::TileAlignment { .. })
        ));
        assert!(matches!(
            image.channel_data("Q", V2i::new(0, 0), &context),
            Err(ShadingError::MissingChannel(name)) if name == "Q"
        ));
    }

    #[test]
    fn memory_image_hashes_follow_content() {
        let mut image = MemoryImage::new(Format::new(64, 64), vec!["R".into()]);
        let context = Context::new();
        let origin = V2i::new(0, 0);
        let before = image.channel_data_hash("R", origin, &context).unwrap();
        image
            .set_channel_data("R", origin, vec![0.5; tile_pixels()])
            .unwrap();
        let after = image.channel_data_hash("R", origin, &context).unwrap();
        assert_ne!(before, after);
        assert_eq!(
            after,
            image.channel_data_hash("R", origin, &context).unwrap()
        );
    }
}
