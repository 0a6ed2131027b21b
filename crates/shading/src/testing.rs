//! Instrumented sources and engines shared by the unit tests.
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::context::Context;
use crate::engine::{ShadeOutputs, ShadeValue, ShadingEngine};
use crate::error::ShadingError;
use crate::hash::{Digest, DigestBuilder};
use crate::image::{Box2i, Format, V2i};
use crate::points::ShadingPoints;
use crate::source::ImageSource;

/// Wraps a source and counts channel reads.
pub(crate) struct CountingSource<S> {
    inner: S,
    channel_fetches: AtomicUsize,
    channel_hashes: AtomicUsize,
}

impl<S> CountingSource<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            channel_fetches: AtomicUsize::new(0),
            channel_hashes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn channel_fetches(&self) -> usize {
        self.channel_fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn channel_hashes(&self) -> usize {
        self.channel_hashes.load(Ordering::SeqCst)
    }
}

impl<S: ImageSource> ImageSource for CountingSource<S> {
    fn format(&self, context: &Context) -> Result<Format, ShadingError> {
        self.inner.format(context)
    }

    fn data_window(&self, context: &Context) -> Result<Box2i, ShadingError> {
        self.inner.data_window(context)
    }

    fn channel_names(&self, context: &Context) -> Result<Arc<Vec<String>>, ShadingError> {
        self.inner.channel_names(context)
    }

    fn deep(&self, context: &Context) -> Result<bool, ShadingError> {
        self.inner.deep(context)
    }

    fn sample_offsets(
        &self,
        tile_origin: V2i,
        context: &Context,
    ) -> Result<Arc<Vec<i32>>, ShadingError> {
        self.inner.sample_offsets(tile_origin, context)
    }

    fn channel_data(
        &self,
        channel: &str,
        tile_origin: V2i,
        context: &Context,
    ) -> Result<Arc<Vec<f32>>, ShadingError> {
        self.channel_fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.channel_data(channel, tile_origin, context)
    }

    fn sample_offsets_hash(
        &self,
        tile_origin: V2i,
        context: &Context,
    ) -> Result<Digest, ShadingError> {
        self.inner.sample_offsets_hash(tile_origin, context)
    }

    fn channel_data_hash(
        &self,
        channel: &str,
        tile_origin: V2i,
        context: &Context,
    ) -> Result<Digest, ShadingError> {
        self.channel_hashes.fetch_add(1, Ordering::SeqCst);
        self.inner.channel_data_hash(channel, tile_origin, context)
    }
}

/// Writes `uOut` from the point UVs and `<name>Doubled` for every attribute it
/// needs, counting each call to `shade`.
#[derive(Debug, Default)]
pub(crate) struct RecordingEngine {
    needs: BTreeSet<String>,
    seed: u64,
    extra: Vec<(String, ShadeValue)>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingEngine {
    pub(crate) fn needing(names: &[&str]) -> Self {
        Self {
            needs: names.iter().map(|name| name.to_string()).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub(crate) fn with_extra(mut self, name: &str, value: ShadeValue) -> Self {
        self.extra.push((name.to_string(), value));
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ShadingEngine for RecordingEngine {
    fn needs_attribute(&self, name: &str) -> bool {
        self.needs.contains(name)
    }

    fn hash(&self, builder: &mut DigestBuilder) {
        builder.append("recording").append(&self.needs).append(&self.seed);
    }

    fn shade(&self, points: &ShadingPoints) -> Result<ShadeOutputs> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            bail!("recording engine asked to fail");
        }

        let mut outputs = ShadeOutputs::new();
        outputs.insert("uOut".into(), ShadeValue::Floats(points.u.clone()));
        for name in &self.needs {
            if let Some(values) = points.attribute(name) {
                outputs.insert(
                    format!("{name}Doubled"),
                    ShadeValue::Floats(values.iter().map(|value| value * 2.0).collect()),
                );
            }
        }
        for (name, value) in &self.extra {
            outputs.insert(name.clone(), value.clone());
        }
        Ok(outputs)
    }
}
