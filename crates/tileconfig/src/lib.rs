use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

pub const DEFAULT_CACHE_CAPACITY: usize = 256;
/// Largest accepted width or height, in pixels.
pub const MAX_FORMAT_SIDE: u32 = 65_536;
/// Largest accepted `input.deep_samples`.
pub const MAX_DEEP_SAMPLES: u32 = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TileshadeConfig {
    pub version: u32,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputSection>,
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSection {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Defaults {
    /// Format of the opaque black image read when no `[input]` is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<f64>,
}

/// A constant upstream image.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputSection {
    pub format: FormatSize,
    #[serde(default)]
    pub channels: BTreeMap<String, f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_samples: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChannelSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub value: ChannelValueSpec,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ChannelValueSpec {
    Float(f32),
    Color([f32; 3]),
    Closure(String),
    Int(i32),
    String(String),
    Vector2([f32; 2]),
}

impl ChannelValueSpec {
    pub fn type_name(&self) -> &'static str {
        match self {
            ChannelValueSpec::Float(_) => "float",
            ChannelValueSpec::Color(_) => "color",
            ChannelValueSpec::Closure(_) => "closure",
            ChannelValueSpec::Int(_) => "int",
            ChannelValueSpec::String(_) => "string",
            ChannelValueSpec::Vector2(_) => "vector2",
        }
    }

    fn floats(&self) -> &[f32] {
        match self {
            ChannelValueSpec::Float(value) => std::slice::from_ref(value),
            ChannelValueSpec::Color(values) => values,
            ChannelValueSpec::Vector2(values) => values,
            _ => &[],
        }
    }
}

/// Image resolution written as `"WIDTHxHEIGHT"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSize {
    pub width: u32,
    pub height: u32,
}

impl FormatSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for FormatSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for FormatSize {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        let (width, height) = normalized
            .split_once('x')
            .ok_or_else(|| format!("invalid format '{raw}'; expected WIDTHxHEIGHT"))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|err| format!("invalid format '{raw}': {err}"))
        };
        Ok(Self::new(parse(width)?, parse(height)?))
    }
}

impl Serialize for FormatSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FormatSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl<'de> de::Visitor<'de> for Visitor {
            type Value = FormatSize;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a format such as \"1920x1080\" or a [width, height] pair")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                v.parse().map_err(E::custom)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let width = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let height = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                Ok(FormatSize::new(width, height))
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

fn default_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

impl Default for TileshadeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            cache: CacheSection::default(),
            defaults: Defaults::default(),
            input: None,
            channels: Vec::new(),
        }
    }
}

impl TileshadeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: TileshadeConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn frame(&self) -> f64 {
        self.defaults.frame.unwrap_or(1.0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid(
                "cache.capacity must be greater than zero".into(),
            ));
        }

        if let Some(format) = self.defaults.format {
            validate_format("defaults.format", format)?;
        }

        if let Some(frame) = self.defaults.frame {
            if !frame.is_finite() {
                return Err(ConfigError::Invalid("defaults.frame must be finite".into()));
            }
        }

        if let Some(input) = &self.input {
            validate_format("input.format", input.format)?;
            if let Some(samples) = input.deep_samples {
                if samples > MAX_DEEP_SAMPLES {
                    return Err(ConfigError::Invalid(format!(
                        "input.deep_samples must be at most {MAX_DEEP_SAMPLES}, got {samples}"
                    )));
                }
            }
            for (name, value) in &input.channels {
                if name.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "input.channels contains an empty channel name".into(),
                    ));
                }
                if !value.is_finite() {
                    return Err(ConfigError::Invalid(format!(
                        "input channel '{name}' must be finite"
                    )));
                }
            }
        }

        for (index, channel) in self.channels.iter().enumerate() {
            let requires_name = matches!(channel.value, ChannelValueSpec::Float(_));
            if requires_name && channel.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "channel #{index} of type float must have a name"
                )));
            }

            if channel.value.floats().iter().any(|value| !value.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "channel '{}' value must be finite",
                    channel.name
                )));
            }
        }

        Ok(())
    }
}

fn validate_format(section: &str, format: FormatSize) -> Result<(), ConfigError> {
    if format.width == 0 || format.height == 0 {
        return Err(ConfigError::Invalid(format!(
            "{section} must have a non-zero width and height, got {format}"
        )));
    }
    if format.width > MAX_FORMAT_SIDE || format.height > MAX_FORMAT_SIDE {
        return Err(ConfigError::Invalid(format!(
            "{section} {format} is too large; each side must be at most {MAX_FORMAT_SIDE}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[cache]
capacity = 64

[defaults]
format = "320x200"
frame = 12

[input]
format = "128x64"
deep_samples = 2

[input.channels]
R = 0.25
A = 1

[[channels]]
name = "mask"
type = "float"
value = 0.5

[[channels]]
name = "spec"
type = "color"
value = [1.0, 0.5, 0]
enabled = false

[[channels]]
type = "closure"
value = "emission"
"#;

    #[test]
    fn parses_sample_config() {
        let config = TileshadeConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.cache.capacity, 64);
        assert_eq!(config.defaults.format, Some(FormatSize::new(320, 200)));
        assert_eq!(config.frame(), 12.0);

        let input = config.input.as_ref().unwrap();
        assert_eq!(input.format, FormatSize::new(128, 64));
        assert_eq!(input.deep_samples, Some(2));
        assert_eq!(input.channels.get("A"), Some(&1.0));

        assert_eq!(config.channels.len(), 3);
        assert_eq!(config.channels[0].value, ChannelValueSpec::Float(0.5));
        assert_eq!(config.channels[1].enabled, Some(false));
        assert_eq!(
            config.channels[1].value,
            ChannelValueSpec::Color([1.0, 0.5, 0.0])
        );
        assert_eq!(config.channels[2].name, "");
        assert_eq!(config.channels[2].value.type_name(), "closure");
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = TileshadeConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config.cache.capacity, DEFAULT_CACHE_CAPACITY);
        assert!(config.input.is_none());
        assert!(config.channels.is_empty());
        assert_eq!(config.frame(), 1.0);
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = TileshadeConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_capacity_and_empty_format() {
        let err = TileshadeConfig::from_toml_str("version = 1\n[cache]\ncapacity = 0\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = TileshadeConfig::from_toml_str("version = 1\n[defaults]\nformat = \"0x10\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_oversized_formats() {
        let err = TileshadeConfig::from_toml_str(
            "version = 1\n[defaults]\nformat = \"2000000000x2000000000\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("too large"), "{err}");

        let err = TileshadeConfig::from_toml_str("version = 1\n[input]\nformat = \"64x65537\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config =
            TileshadeConfig::from_toml_str("version = 1\n[defaults]\nformat = [65536, 1]\n");
        assert!(config.is_ok());
    }

    #[test]
    fn caps_deep_sample_count() {
        let config = |samples: u32| {
            format!("version = 1\n[input]\nformat = \"64x64\"\ndeep_samples = {samples}\n")
        };
        let err = TileshadeConfig::from_toml_str(&config(600_000)).unwrap_err();
        assert!(err.to_string().contains("deep_samples"), "{err}");
        assert!(TileshadeConfig::from_toml_str(&config(MAX_DEEP_SAMPLES)).is_ok());
        assert!(TileshadeConfig::from_toml_str(&config(MAX_DEEP_SAMPLES + 1)).is_err());
    }

    #[test]
    fn rejects_malformed_format_string() {
        let err = TileshadeConfig::from_toml_str("version = 1\n[defaults]\nformat = \"wide\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn accepts_format_pair() {
        let config =
            TileshadeConfig::from_toml_str("version = 1\n[defaults]\nformat = [64, 32]\n").unwrap();
        assert_eq!(config.defaults.format, Some(FormatSize::new(64, 32)));
    }

    #[test]
    fn float_channel_requires_name() {
        let config = r#"
version = 1

[[channels]]
type = "float"
value = 1.0
"#;
        let err = TileshadeConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unsupported_kinds_still_parse() {
        let config = r#"
version = 1

[[channels]]
name = "uv"
type = "vector2"
value = [0.0, 1.0]
"#;
        let config = TileshadeConfig::from_toml_str(config).unwrap();
        assert_eq!(config.channels[0].value, ChannelValueSpec::Vector2([0.0, 1.0]));
    }

    #[test]
    fn serialises_back_to_toml() {
        let config = TileshadeConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("format = \"320x200\""));
        let reparsed = TileshadeConfig::from_toml_str(&text).unwrap();
        assert_eq!(reparsed.channels, config.channels);
    }
}
