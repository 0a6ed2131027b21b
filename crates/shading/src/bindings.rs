use serde::Serialize;

use crate::codegen::{generate_program, BindingWarning, GeneratedProgram};

/// The value a channel binding feeds into the generated program.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum BindingValue {
    Float(f32),
    Color3([f32; 3]),
    /// A reference to an upstream shader network producing a closure.
    Closure(String),
    Int(i32),
    Text(String),
    Vector2([f32; 2]),
}

impl BindingValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            BindingValue::Float(_) => "float",
            BindingValue::Color3(_) => "color3",
            BindingValue::Closure(_) => "closure",
            BindingValue::Int(_) => "int",
            BindingValue::Text(_) => "text",
            BindingValue::Vector2(_) => "vector2",
        }
    }
}

/// Maps a named value onto an output channel (float), a layer of channels
/// (color) or the closure sum, optionally guarded by an enable switch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelBinding {
    pub name: String,
    pub value: BindingValue,
    pub enabled: Option<bool>,
}

impl ChannelBinding {
    pub fn new(name: impl Into<String>, value: BindingValue) -> Self {
        Self {
            name: name.into(),
            value,
            enabled: None,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn is_active(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// Ordered list of channel bindings together with the program generated from
/// them. Every mutation regenerates the program, so it always reflects the
/// current list.
#[derive(Debug, Clone)]
pub struct ChannelBindingSet {
    bindings: Vec<ChannelBinding>,
    program: GeneratedProgram,
    warnings: Vec<BindingWarning>,
}

impl Default for ChannelBindingSet {
    fn default() -> Self {
        let (program, warnings) = generate_program(&[]);
        Self {
            bindings: Vec::new(),
            program,
            warnings,
        }
    }
}

impl ChannelBindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bindings(bindings: Vec<ChannelBinding>) -> Self {
        let mut set = Self {
            bindings,
            ..Self::default()
        };
        set.regenerate();
        set
    }

    pub fn bindings(&self) -> &[ChannelBinding] {
        &self.bindings
    }

    pub fn program(&self) -> &GeneratedProgram {
        &self.program
    }

    /// Bindings skipped during the last regeneration.
    pub fn warnings(&self) -> &[BindingWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn add(&mut self, binding: ChannelBinding) -> &GeneratedProgram {
        self.bindings.push(binding);
        self.regenerate();
        &self.program
    }

    pub fn insert(&mut self, index: usize, binding: ChannelBinding) -> &GeneratedProgram {
        let index = index.min(self.bindings.len());
        self.bindings.insert(index, binding);
        self.regenerate();
        &self.program
    }

    /// Removes the first binding called `name`.
    pub fn remove(&mut self, name: &str) -> Option<ChannelBinding> {
        let index = self.bindings.iter().position(|b| b.name == name)?;
        self.remove_at(index)
    }

    pub fn remove_at(&mut self, index: usize) -> Option<ChannelBinding> {
        if index >= self.bindings.len() {
            return None;
        }
        let removed = self.bindings.remove(index);
        self.regenerate();
        Some(removed)
    }

    /// Replaces the value and enable switch of the first binding called `name`.
    pub fn update(&mut self, name: &str, value: BindingValue, enabled: Option<bool>) -> bool {
        let Some(binding) = self.bindings.iter_mut().find(|b| b.name == name) else {
            return false;
        };
        binding.value = value;
        binding.enabled = enabled;
        self.regenerate();
        true
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
        self.regenerate();
    }

    fn regenerate(&mut self) {
        let (program, warnings) = generate_program(&self.bindings);
        self.program = program;
        self.warnings = warnings;
    }
}
