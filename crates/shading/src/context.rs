use std::collections::BTreeMap;

use crate::hash::{Digest, DigestBuilder};

/// A value stored in an evaluation [`Context`].
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Named variables that parameterise an evaluation, such as the frame number.
///
/// Variables are kept ordered by name so the digest does not depend on
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    variables: BTreeMap<String, ContextValue>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: ContextValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_frame(self, frame: f64) -> Self {
        self.with("frame", ContextValue::Float(frame))
    }

    pub fn set(&mut self, name: impl Into<String>, value: ContextValue) {
        self.variables.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ContextValue> {
        self.variables.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ContextValue> {
        self.variables.remove(name)
    }

    pub fn frame(&self) -> f64 {
        match self.variables.get("frame") {
            Some(ContextValue::Float(frame)) => *frame,
            Some(ContextValue::Int(frame)) => *frame as f64,
            _ => 1.0,
        }
    }

    pub fn hash_into(&self, builder: &mut DigestBuilder) {
        builder.append(&self.variables.len());
        for (name, value) in &self.variables {
            builder.append(name);
            match value {
                ContextValue::Int(v) => builder.append(&0u8).append(v),
                ContextValue::Float(v) => builder.append(&1u8).append_f64(*v),
                ContextValue::Text(v) => builder.append(&2u8).append(v),
            };
        }
    }

    pub fn digest(&self) -> Digest {
        let mut builder = DigestBuilder::new();
        self.hash_into(&mut builder);
        builder.finish()
    }
}
