//! Generates shading-language source from a list of channel bindings.
//!
//! The program starts from an empty closure (`Ci = 0;`) and adds one statement
//! per supported binding:
//!
//! - closures are summed directly into `Ci`;
//! - floats go through `outChannel( name, value )`;
//! - colors go through `outLayer( name, value )`.
//!
//! Bindings with an enable switch get an integer guard parameter and a
//! conditional around their statement. Parameter names are derived from the
//! binding list alone, so generating twice from the same list gives the same
//! program.
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::bindings::{BindingValue, ChannelBinding};
use crate::hash::DigestBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Int,
    Float,
    Color3,
    String,
    Closure,
}

/// Which part of a binding drives a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterSource {
    Enabled,
    Name,
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    /// Index of the binding in the list the program was generated from.
    pub binding: usize,
    pub source: ParameterSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedProgram {
    pub code: String,
    pub parameters: Vec<Parameter>,
}

impl GeneratedProgram {
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn parameters_for(&self, binding: usize) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(move |p| p.binding == binding)
    }

    /// Same parameters and same code once whitespace is ignored.
    pub fn equivalent(&self, other: &GeneratedProgram) -> bool {
        fn compact(code: &str) -> String {
            code.chars().filter(|c| !c.is_whitespace()).collect()
        }
        self.parameters == other.parameters && compact(&self.code) == compact(&other.code)
    }

    pub fn hash_into(&self, builder: &mut DigestBuilder) {
        builder.append(&self.code).append(&self.parameters);
    }
}

/// A binding that could not be turned into a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingWarning {
    pub index: usize,
    pub binding: String,
    pub value_type: &'static str,
}

impl fmt::Display for BindingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not create channel from binding '{}' (#{}) of type {}",
            self.binding, self.index, self.value_type
        )
    }
}

#[derive(Default)]
struct ParameterNames {
    used: HashMap<&'static str, usize>,
}

impl ParameterNames {
    /// `base`, then `base1`, `base2`, ...
    fn next(&mut self, base: &'static str) -> String {
        let count = self.used.entry(base).or_insert(0);
        let name = if *count == 0 {
            base.to_string()
        } else {
            format!("{base}{count}")
        };
        *count += 1;
        name
    }
}

pub fn generate_program(bindings: &[ChannelBinding]) -> (GeneratedProgram, Vec<BindingWarning>) {
    let mut code = String::from("Ci = 0;\n");
    let mut parameters = Vec::new();
    let mut warnings = Vec::new();
    let mut names = ParameterNames::default();

    for (index, binding) in bindings.iter().enumerate() {
        let (out_function, value_kind) = match &binding.value {
            BindingValue::Closure(_) => (None, ParameterKind::Closure),
            BindingValue::Float(_) => (Some("outChannel"), ParameterKind::Float),
            BindingValue::Color3(_) => (Some("outLayer"), ParameterKind::Color3),
            other => {
                let warning = BindingWarning {
                    index,
                    binding: binding.name.clone(),
                    value_type: other.type_name(),
                };
                warn!(binding = %binding.name, index, value_type = warning.value_type, "{warning}");
                warnings.push(warning);
                continue;
            }
        };

        let mut prefix = String::new();
        if binding.enabled.is_some() {
            let enable = names.next("enable");
            prefix = format!("if( {enable} ) ");
            parameters.push(Parameter {
                name: enable,
                kind: ParameterKind::Int,
                binding: index,
                source: ParameterSource::Enabled,
            });
        }

        match out_function {
            None => {
                let closure = names.next("closureIn");
                code.push_str(&format!("{prefix}Ci += {closure};\n"));
                parameters.push(Parameter {
                    name: closure,
                    kind: value_kind,
                    binding: index,
                    source: ParameterSource::Value,
                });
            }
            Some(function) => {
                let name = names.next("name");
                let value = names.next("value");
                code.push_str(&format!("{prefix}Ci += {function}( {name}, {value});\n"));
                parameters.push(Parameter {
                    name,
                    kind: ParameterKind::String,
                    binding: index,
                    source: ParameterSource::Name,
                });
                parameters.push(Parameter {
                    name: value,
                    kind: value_kind,
                    binding: index,
                    source: ParameterSource::Value,
                });
            }
        }
    }

    (GeneratedProgram { code, parameters }, warnings)
}
