use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::bindings::{BindingValue, ChannelBinding};
use crate::codegen::{GeneratedProgram, ParameterSource};
use crate::engine::{ShadeOutputs, ShadeValue, ShadingEngine};
use crate::error::ShadingError;
use crate::hash::DigestBuilder;
use crate::points::ShadingPoints;

/// Turns a generated program and the bindings it was generated from into an
/// engine.
pub trait ProgramCompiler: Send + Sync {
    fn compile(
        &self,
        program: &GeneratedProgram,
        bindings: &[ChannelBinding],
    ) -> Result<Arc<dyn ShadingEngine>, ShadingError>;
}

/// Compiles programs into [`BindingEngine`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindingCompiler;

impl ProgramCompiler for BindingCompiler {
    fn compile(
        &self,
        program: &GeneratedProgram,
        bindings: &[ChannelBinding],
    ) -> Result<Arc<dyn ShadingEngine>, ShadingError> {
        Ok(Arc::new(BindingEngine::from_program(program, bindings)?))
    }
}

/// Evaluates a channel program in-process by writing each bound constant to
/// its output channel.
///
/// A float binding writes one channel named after the binding. A color binding
/// writes `<layer>.R`, `<layer>.G` and `<layer>.B`, or plain `R`, `G` and `B`
/// when the layer name is empty. Disabled bindings write nothing, and closures
/// have no channel representation so they are ignored. Later bindings win
/// when two write the same channel.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingEngine {
    code: String,
    outputs: BTreeMap<String, f32>,
}

impl BindingEngine {
    pub fn from_program(
        program: &GeneratedProgram,
        bindings: &[ChannelBinding],
    ) -> Result<Self, ShadingError> {
        let mut outputs = BTreeMap::new();
        for parameter in &program.parameters {
            if parameter.source != ParameterSource::Value {
                continue;
            }
            let binding = bindings.get(parameter.binding).ok_or_else(|| {
                ShadingError::Compile(format!(
                    "parameter '{}' refers to binding #{} but only {} bindings were supplied",
                    parameter.name,
                    parameter.binding,
                    bindings.len()
                ))
            })?;
            if !binding.is_active() {
                continue;
            }
            match &binding.value {
                BindingValue::Float(value) => {
                    outputs.insert(binding.name.clone(), *value);
                }
                BindingValue::Color3(color) => {
                    for (suffix, value) in ["R", "G", "B"].into_iter().zip(color) {
                        outputs.insert(layer_channel(&binding.name, suffix), *value);
                    }
                }
                BindingValue::Closure(network) => {
                    debug!(network = %network, "closure bindings produce no channels");
                }
                other => {
                    return Err(ShadingError::Compile(format!(
                        "parameter '{}' is bound to unsupported {} value",
                        parameter.name,
                        other.type_name()
                    )));
                }
            }
        }

        Ok(Self {
            code: program.code.clone(),
            outputs,
        })
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }
}

fn layer_channel(layer: &str, channel: &str) -> String {
    if layer.is_empty() {
        channel.to_string()
    } else {
        format!("{layer}.{channel}")
    }
}

impl ShadingEngine for BindingEngine {
    fn needs_attribute(&self, _name: &str) -> bool {
        false
    }

    fn hash(&self, builder: &mut DigestBuilder) {
        builder.append("binding-engine").append(&self.code);
        for (name, value) in &self.outputs {
            builder.append(name).append_f32(*value);
        }
    }

    fn shade(&self, points: &ShadingPoints) -> Result<ShadeOutputs> {
        Ok(self
            .outputs
            .iter()
            .map(|(name, value)| (name.clone(), ShadeValue::Floats(vec![*value; points.len()])))
            .collect())
    }
}
