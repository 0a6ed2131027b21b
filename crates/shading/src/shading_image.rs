//! The image node that runs a shading engine over the tiles of its input.
//!
//! All shading for a tile is done once, by the `Shading` output, and memoized
//! under a digest of everything it reads. Channel names and channel data are
//! then answered from that single result:
//!
//! - channel names are the input's names plus the outputs of the data
//!   window's first tile;
//! - channel data is the shaded channel when there is one, and the input's
//!   data otherwise.
//!
//! Without a shader the node passes its input through untouched. Without an
//! input it reads an opaque black constant in `default_format`.
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::debug;

use crate::bindings::{BindingValue, ChannelBinding, ChannelBindingSet};
use crate::builtin::ProgramCompiler;
use crate::cache::{CacheStats, ShadingCache};
use crate::context::Context;
use crate::engine::ShadingEngine;
use crate::error::ShadingError;
use crate::hash::{digest_of, Digest, DigestBuilder};
use crate::image::{ensure_tile_aligned, tile_origin, Box2i, Format, V2i};
use crate::node::{CachePolicy, ComputeNode, Plug, PlugValue, Request};
use crate::points::build_points;
use crate::result::ShadingResult;
use crate::source::{ConstantImage, ImageSource};

pub struct ShadingImage {
    input: Option<Arc<dyn ImageSource>>,
    default_input: ConstantImage,
    shader: Option<Arc<dyn ShadingEngine>>,
    compiler: Option<Arc<dyn ProgramCompiler>>,
    channels: ChannelBindingSet,
    cache: ShadingCache,
}

impl Default for ShadingImage {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadingImage {
    pub fn new() -> Self {
        Self::with_cache(ShadingCache::default())
    }

    pub fn with_cache_capacity(capacity: NonZeroUsize) -> Self {
        Self::with_cache(ShadingCache::new(capacity))
    }

    fn with_cache(cache: ShadingCache) -> Self {
        Self {
            input: None,
            default_input: ConstantImage::black(Format::default()),
            shader: None,
            compiler: None,
            channels: ChannelBindingSet::new(),
            cache,
        }
    }

    pub fn set_input(&mut self, input: Option<Arc<dyn ImageSource>>) {
        self.input = input;
    }

    pub fn set_default_format(&mut self, format: Format) {
        self.default_input.set_format(format);
    }

    /// Connects an engine directly, detaching any program compiler.
    pub fn connect_shader(&mut self, engine: Arc<dyn ShadingEngine>) {
        self.compiler = None;
        self.shader = Some(engine);
    }

    pub fn disconnect_shader(&mut self) {
        self.compiler = None;
        self.shader = None;
    }

    pub fn shader(&self) -> Option<&Arc<dyn ShadingEngine>> {
        self.shader.as_ref()
    }

    /// Drives the shader from the channel bindings: the generated program is
    /// compiled now and again whenever the bindings change. On a compile
    /// failure the previous compiler and shader stay in place.
    pub fn use_compiler(
        &mut self,
        compiler: Arc<dyn ProgramCompiler>,
    ) -> Result<(), ShadingError> {
        let previous = self.compiler.replace(compiler);
        if let Err(err) = self.recompile() {
            self.compiler = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn channels(&self) -> &ChannelBindingSet {
        &self.channels
    }

    pub fn add_channel(&mut self, binding: ChannelBinding) -> Result<(), ShadingError> {
        self.edit_channels(|channels| {
            channels.add(binding);
            true
        })?;
        Ok(())
    }

    pub fn insert_channel(
        &mut self,
        index: usize,
        binding: ChannelBinding,
    ) -> Result<(), ShadingError> {
        self.edit_channels(|channels| {
            channels.insert(index, binding);
            true
        })?;
        Ok(())
    }

    pub fn remove_channel(&mut self, name: &str) -> Result<Option<ChannelBinding>, ShadingError> {
        let mut removed = None;
        self.edit_channels(|channels| {
            removed = channels.remove(name);
            removed.is_some()
        })?;
        Ok(removed)
    }

    pub fn update_channel(
        &mut self,
        name: &str,
        value: BindingValue,
        enabled: Option<bool>,
    ) -> Result<bool, ShadingError> {
        self.edit_channels(|channels| channels.update(name, value, enabled))
    }

    /// Applies `edit` and recompiles when it reports a change. If the
    /// compiler rejects the new program the bindings are restored, so the
    /// program and the shader stay in step.
    fn edit_channels<F>(&mut self, edit: F) -> Result<bool, ShadingError>
    where
        F: FnOnce(&mut ChannelBindingSet) -> bool,
    {
        let previous = self.channels.clone();
        if !edit(&mut self.channels) {
            return Ok(false);
        }
        if let Err(err) = self.recompile() {
            self.channels = previous;
            return Err(err);
        }
        Ok(true)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn recompile(&mut self) -> Result<(), ShadingError> {
        let Some(compiler) = &self.compiler else {
            return Ok(());
        };
        let engine = compiler.compile(self.channels.program(), self.channels.bindings())?;
        debug!(
            bindings = self.channels.len(),
            parameters = self.channels.program().parameters.len(),
            "recompiled channel program"
        );
        self.shader = Some(engine);
        Ok(())
    }

    fn source(&self) -> &dyn ImageSource {
        match &self.input {
            Some(input) => input.as_ref(),
            None => &self.default_input,
        }
    }

    /// Digest identifying the shading result for one tile.
    pub fn hash_shading(&self, tile: V2i, context: &Context) -> Result<Digest, ShadingError> {
        let Some(engine) = &self.shader else {
            return Ok(unshaded_digest());
        };
        ensure_tile_aligned(tile)?;

        let source = self.source();
        let mut builder = DigestBuilder::new();
        builder.append("shading").append(&tile);
        context.hash_into(&mut builder);
        builder.append_digest(source.format_hash(context)?);
        builder.append_digest(source.channel_names_hash(context)?);

        let deep = source.deep(context)?;
        builder.append(&deep);
        if deep {
            builder.append_digest(source.sample_offsets_hash(tile, context)?);
        }

        for channel in source.channel_names(context)?.iter() {
            if engine.needs_attribute(channel) {
                builder
                    .append(channel)
                    .append_digest(source.channel_data_hash(channel, tile, context)?);
            }
        }

        engine.hash(&mut builder);
        Ok(builder.finish())
    }

    /// Runs the engine for one tile, bypassing the cache.
    pub fn compute_shading(
        &self,
        tile: V2i,
        context: &Context,
    ) -> Result<ShadingResult, ShadingError> {
        let Some(engine) = &self.shader else {
            return Ok(ShadingResult::default());
        };

        let points = build_points(self.source(), engine.as_ref(), tile, context)?;
        let outputs = engine.shade(&points).map_err(ShadingError::engine)?;
        let result = ShadingResult::from_outputs(outputs, points.len())?;
        debug!(tile = %tile, points = points.len(), channels = result.len(), "shaded tile");
        Ok(result)
    }

    /// The memoized shading result for one tile.
    pub fn shading(
        &self,
        tile: V2i,
        context: &Context,
    ) -> Result<Arc<ShadingResult>, ShadingError> {
        if self.shader.is_none() {
            return Ok(Arc::new(ShadingResult::default()));
        }
        let key = self.hash_shading(tile, context)?;
        self.cache
            .get_or_compute(key, || self.compute_shading(tile, context))
    }

    fn first_tile(&self, context: &Context) -> Result<Option<V2i>, ShadingError> {
        let data_window = self.source().data_window(context)?;
        if data_window.is_empty() {
            Ok(None)
        } else {
            Ok(Some(tile_origin(data_window.min)))
        }
    }

    pub fn channel_names(&self, context: &Context) -> Result<Vec<String>, ShadingError> {
        let mut names: BTreeSet<String> = self
            .source()
            .channel_names(context)?
            .iter()
            .cloned()
            .collect();

        if let Some(tile) = self.first_tile(context)? {
            let shading = self.shading(tile, context)?;
            names.extend(shading.names().map(str::to_string));
        }

        Ok(names.into_iter().collect())
    }

    /// Reads straight from the cached shading result. The returned data is
    /// shared with that result, never copied or cached again.
    pub fn channel_data(
        &self,
        channel: &str,
        tile: V2i,
        context: &Context,
    ) -> Result<Arc<Vec<f32>>, ShadingError> {
        if self.first_tile(context)?.is_some() {
            if let Some(data) = self.shading(tile, context)?.channel(channel) {
                return Ok(data);
            }
        }
        self.source().channel_data(channel, tile, context)
    }

    pub fn format(&self, context: &Context) -> Result<Format, ShadingError> {
        self.source().format(context)
    }

    pub fn data_window(&self, context: &Context) -> Result<Box2i, ShadingError> {
        self.source().data_window(context)
    }

    pub fn deep(&self, context: &Context) -> Result<bool, ShadingError> {
        self.source().deep(context)
    }

    pub fn sample_offsets(
        &self,
        tile: V2i,
        context: &Context,
    ) -> Result<Arc<Vec<i32>>, ShadingError> {
        self.source().sample_offsets(tile, context)
    }

    pub fn hash_channel_names(&self, context: &Context) -> Result<Digest, ShadingError> {
        let mut builder = DigestBuilder::new();
        builder
            .append("channelNames")
            .append_digest(self.source().channel_names_hash(context)?);
        if let Some(tile) = self.first_tile(context)? {
            builder.append_digest(self.hash_shading(tile, context)?);
        }
        Ok(builder.finish())
    }

    pub fn hash_channel_data(
        &self,
        channel: &str,
        tile: V2i,
        context: &Context,
    ) -> Result<Digest, ShadingError> {
        let source = self.source();
        let mut builder = DigestBuilder::new();
        builder.append("channelData").append(channel).append(&tile);
        if self.first_tile(context)?.is_some() {
            builder.append_digest(self.hash_shading(tile, context)?);
        }
        if source.channel_names(context)?.iter().any(|name| name == channel) {
            builder.append_digest(source.channel_data_hash(channel, tile, context)?);
        }
        Ok(builder.finish())
    }

    pub fn hash_format(&self, context: &Context) -> Result<Digest, ShadingError> {
        self.source().format_hash(context)
    }

    pub fn hash_data_window(&self, context: &Context) -> Result<Digest, ShadingError> {
        self.source().data_window_hash(context)
    }
}

fn unshaded_digest() -> Digest {
    digest_of("unshaded")
}

fn push_unique(outputs: &mut Vec<Plug>, plug: Plug) {
    if !outputs.contains(&plug) {
        outputs.push(plug);
    }
}

impl ComputeNode for ShadingImage {
    fn affects(&self, input: Plug) -> Vec<Plug> {
        let mut outputs = Vec::new();
        if matches!(
            input,
            Plug::Shader
                | Plug::DefaultFormat
                | Plug::InFormat
                | Plug::InChannelNames
                | Plug::InChannelData
                | Plug::InDeep
                | Plug::InSampleOffsets
        ) {
            push_unique(&mut outputs, Plug::Shading);
        }
        match input {
            Plug::Shading => {
                push_unique(&mut outputs, Plug::OutChannelNames);
                push_unique(&mut outputs, Plug::OutChannelData);
            }
            Plug::InFormat => push_unique(&mut outputs, Plug::OutFormat),
            Plug::DefaultFormat => {
                push_unique(&mut outputs, Plug::OutFormat);
                push_unique(&mut outputs, Plug::OutDataWindow);
            }
            Plug::InDataWindow => {
                push_unique(&mut outputs, Plug::OutDataWindow);
                push_unique(&mut outputs, Plug::OutChannelNames);
                push_unique(&mut outputs, Plug::OutChannelData);
            }
            Plug::InChannelNames => push_unique(&mut outputs, Plug::OutChannelNames),
            Plug::InChannelData => push_unique(&mut outputs, Plug::OutChannelData),
            Plug::InDeep => push_unique(&mut outputs, Plug::OutDeep),
            Plug::InSampleOffsets => push_unique(&mut outputs, Plug::OutSampleOffsets),
            _ => {}
        }
        outputs
    }

    fn hash(&self, output: Plug, request: &Request<'_>) -> Result<Digest, ShadingError> {
        let context = request.context;
        match output {
            Plug::Shading => self.hash_shading(request.tile_origin, context),
            Plug::OutChannelNames => self.hash_channel_names(context),
            Plug::OutChannelData => {
                let channel = request
                    .channel_name
                    .ok_or(ShadingError::MissingChannelName(output))?;
                self.hash_channel_data(channel, request.tile_origin, context)
            }
            Plug::OutFormat => self.hash_format(context),
            Plug::OutDataWindow => self.hash_data_window(context),
            Plug::OutDeep => Ok(digest_of(&self.deep(context)?)),
            Plug::OutSampleOffsets => self
                .source()
                .sample_offsets_hash(request.tile_origin, context),
            other => Err(ShadingError::NotAnOutput(other)),
        }
    }

    fn compute(&self, output: Plug, request: &Request<'_>) -> Result<PlugValue, ShadingError> {
        let context = request.context;
        match output {
            Plug::Shading => Ok(PlugValue::Shading(
                self.shading(request.tile_origin, context)?,
            )),
            Plug::OutChannelNames => Ok(PlugValue::ChannelNames(self.channel_names(context)?)),
            Plug::OutChannelData => {
                let channel = request
                    .channel_name
                    .ok_or(ShadingError::MissingChannelName(output))?;
                Ok(PlugValue::ChannelData(self.channel_data(
                    channel,
                    request.tile_origin,
                    context,
                )?))
            }
            Plug::OutFormat => Ok(PlugValue::Format(self.format(context)?)),
            Plug::OutDataWindow => Ok(PlugValue::DataWindow(self.data_window(context)?)),
            Plug::OutDeep => Ok(PlugValue::Deep(self.deep(context)?)),
            Plug::OutSampleOffsets => Ok(PlugValue::SampleOffsets(
                self.sample_offsets(request.tile_origin, context)?,
            )),
            other => Err(ShadingError::NotAnOutput(other)),
        }
    }

    fn cache_policy(&self, output: Plug) -> CachePolicy {
        match output {
            Plug::OutChannelData => CachePolicy::Uncached,
            _ => CachePolicy::Cached,
        }
    }
}

/// Lets shading nodes feed one another.
impl ImageSource for ShadingImage {
    fn format(&self, context: &Context) -> Result<Format, ShadingError> {
        ShadingImage::format(self, context)
    }

    fn data_window(&self, context: &Context) -> Result<Box2i, ShadingError> {
        ShadingImage::data_window(self, context)
    }

    fn channel_names(&self, context: &Context) -> Result<Arc<Vec<String>>, ShadingError> {
        ShadingImage::channel_names(self, context).map(Arc::new)
    }

    fn deep(&self, context: &Context) -> Result<bool, ShadingError> {
        ShadingImage::deep(self, context)
    }

    fn sample_offsets(
        &self,
        tile_origin: V2i,
        context: &Context,
    ) -> Result<Arc<Vec<i32>>, ShadingError> {
        ShadingImage::sample_offsets(self, tile_origin, context)
    }

    fn channel_data(
        &self,
        channel: &str,
        tile_origin: V2i,
        context: &Context,
    ) -> Result<Arc<Vec<f32>>, ShadingError> {
        ShadingImage::channel_data(self, channel, tile_origin, context)
    }

    fn format_hash(&self, context: &Context) -> Result<Digest, ShadingError> {
        self.hash_format(context)
    }

    fn data_window_hash(&self, context: &Context) -> Result<Digest, ShadingError> {
        self.hash_data_window(context)
    }

    fn channel_names_hash(&self, context: &Context) -> Result<Digest, ShadingError> {
        self.hash_channel_names(context)
    }

    fn sample_offsets_hash(
        &self,
        tile_origin: V2i,
        context: &Context,
    ) -> Result<Digest, ShadingError> {
        self.source().sample_offsets_hash(tile_origin, context)
    }

    fn channel_data_hash(
        &self,
        channel: &str,
        tile_origin: V2i,
        context: &Context,
    ) -> Result<Digest, ShadingError> {
        self.hash_channel_data(channel, tile_origin, context)
    }
}
