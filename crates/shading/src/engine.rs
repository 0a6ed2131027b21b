use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;

use crate::hash::DigestBuilder;
use crate::points::ShadingPoints;

/// One named output produced by a shading engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ShadeValue {
    Floats(Vec<f32>),
    Vectors(Vec<[f32; 3]>),
    Ints(Vec<i32>),
    Text(String),
}

impl ShadeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ShadeValue::Floats(_) => "floats",
            ShadeValue::Vectors(_) => "vectors",
            ShadeValue::Ints(_) => "ints",
            ShadeValue::Text(_) => "text",
        }
    }
}

pub type ShadeOutputs = BTreeMap<String, ShadeValue>;

/// Evaluates a compiled shading program against a point set.
///
/// Engines are immutable once built and may be invoked from several threads
/// at once with different point sets.
pub trait ShadingEngine: Send + Sync + fmt::Debug {
    /// Whether the program reads the named upstream channel. Channels the
    /// program does not read are never fetched.
    fn needs_attribute(&self, name: &str) -> bool;

    /// Appends a digest of everything that determines the program's output.
    fn hash(&self, builder: &mut DigestBuilder);

    fn shade(&self, points: &ShadingPoints) -> Result<ShadeOutputs>;
}
