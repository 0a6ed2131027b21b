use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use crate::engine::{ShadeOutputs, ShadeValue};
use crate::error::ShadingError;

/// The channels a shading engine produced for one tile, keyed by output name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadingResult {
    channels: BTreeMap<String, Arc<Vec<f32>>>,
}

impl ShadingResult {
    /// Keeps the float outputs of an engine as channels and discards every
    /// other output type. A float output whose length differs from
    /// `point_count` is an error rather than something to drop.
    pub fn from_outputs(outputs: ShadeOutputs, point_count: usize) -> Result<Self, ShadingError> {
        let mut channels = BTreeMap::new();
        for (name, value) in outputs {
            match value {
                ShadeValue::Floats(data) if data.len() == point_count => {
                    channels.insert(name, Arc::new(data));
                }
                ShadeValue::Floats(data) => {
                    return Err(ShadingError::MalformedOutput {
                        name,
                        expected: point_count,
                        actual: data.len(),
                    });
                }
                other => {
                    trace!(
                        output = %name,
                        kind = other.type_name(),
                        "discarding non-channel output"
                    );
                }
            }
        }
        Ok(Self { channels })
    }

    pub fn insert(&mut self, name: impl Into<String>, data: Vec<f32>) {
        self.channels.insert(name.into(), Arc::new(data));
    }

    pub fn channel(&self, name: &str) -> Option<Arc<Vec<f32>>> {
        self.channels.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
