use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use rayon::prelude::*;
use serde::Serialize;
use shading::{
    BindingCompiler, BindingWarning, CacheStats, Context, GeneratedProgram, ShadingImage, V2i,
};
use tileconfig::TileshadeConfig;
use tracing_subscriber::EnvFilter;

use crate::bindings::{channel_binding_from_spec, format_from_size, input_image};
use crate::cli::RenderArgs;
use crate::paths::AppPaths;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// The configuration in use and where it came from.
pub struct LoadedConfig {
    pub config: TileshadeConfig,
    pub source: Option<PathBuf>,
}

/// Reads `explicit`, or the default config file when it exists, or falls back
/// to the built-in defaults.
pub fn load_config(explicit: Option<&Path>, paths: &AppPaths) -> Result<LoadedConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let default = paths.config_file();
            if !default.exists() {
                tracing::debug!(path = %default.display(), "no config file; using defaults");
                return Ok(LoadedConfig {
                    config: TileshadeConfig::default(),
                    source: None,
                });
            }
            default
        }
    };

    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = TileshadeConfig::from_toml_str(&text)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        channels = config.channels.len(),
        capacity = config.cache.capacity,
        "loaded config"
    );
    Ok(LoadedConfig {
        config,
        source: Some(path),
    })
}

pub fn build_node(config: &TileshadeConfig) -> Result<ShadingImage> {
    let capacity = NonZeroUsize::new(config.cache.capacity)
        .ok_or_else(|| anyhow!("cache capacity must be greater than zero"))?;
    let mut node = ShadingImage::with_cache_capacity(capacity);

    if let Some(format) = config.defaults.format {
        node.set_default_format(format_from_size(format));
    }
    if let Some(input) = &config.input {
        node.set_input(Some(Arc::new(input_image(input))));
    }

    node.use_compiler(Arc::new(BindingCompiler))
        .context("failed to compile empty channel program")?;
    for spec in &config.channels {
        node.add_channel(channel_binding_from_spec(spec))
            .with_context(|| format!("failed to bind channel '{}'", spec.name))?;
    }
    Ok(node)
}

#[derive(Debug, Serialize)]
pub struct RenderReport {
    pub config: Option<PathBuf>,
    pub format: String,
    pub frame: f64,
    pub deep: bool,
    pub channels: Vec<String>,
    pub tiles: Vec<TileReport>,
    pub cache: CacheReport,
}

#[derive(Debug, Serialize)]
pub struct TileReport {
    pub origin: V2i,
    pub channels: BTreeMap<String, ChannelSummary>,
}

#[derive(Debug, Serialize)]
pub struct ChannelSummary {
    pub samples: usize,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f32>>,
}

impl ChannelSummary {
    fn from_values(values: &[f32], keep: bool) -> Self {
        let min = values.iter().copied().reduce(f32::min);
        let max = values.iter().copied().reduce(f32::max);
        let mean = if values.is_empty() {
            None
        } else {
            let sum: f64 = values.iter().map(|value| f64::from(*value)).sum();
            Some((sum / values.len() as f64) as f32)
        };
        Self {
            samples: values.len(),
            min,
            max,
            mean,
            values: keep.then(|| values.to_vec()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CacheReport {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl From<CacheStats> for CacheReport {
    fn from(stats: CacheStats) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            entries: stats.entries,
        }
    }
}

pub fn render(loaded: &LoadedConfig, args: &RenderArgs) -> Result<RenderReport> {
    let config = &loaded.config;
    let node = build_node(config)?;
    let context = Context::new().with_frame(args.frame.unwrap_or_else(|| config.frame()));

    let format = node.format(&context)?;
    let tiles = if args.tiles.is_empty() {
        node.data_window(&context)?.tile_origins().collect()
    } else {
        args.tiles.clone()
    };
    let all_channels = node
        .channel_names(&context)
        .context("failed to resolve output channels")?;
    let channels: Vec<String> = if args.channels.is_empty() {
        all_channels.clone()
    } else {
        for name in &args.channels {
            if !all_channels.contains(name) {
                return Err(anyhow!(
                    "channel '{name}' is not produced; available channels: {}",
                    all_channels.join(", ")
                ));
            }
        }
        args.channels.clone()
    };

    tracing::info!(
        tiles = tiles.len(),
        channels = channels.len(),
        frame = context.frame(),
        "shading tiles"
    );

    let passes = if args.repeat { 2 } else { 1 };
    let mut reports = Vec::new();
    for _ in 0..passes {
        reports = tiles
            .par_iter()
            .map(|tile| render_tile(&node, &channels, *tile, &context, args.values))
            .collect::<Result<Vec<_>>>()?;
    }

    let cache = node.cache_stats();
    tracing::info!(hits = cache.hits, misses = cache.misses, "render complete");

    Ok(RenderReport {
        config: loaded.source.clone(),
        format: format.to_string(),
        frame: context.frame(),
        deep: node.deep(&context)?,
        channels,
        tiles: reports,
        cache: cache.into(),
    })
}

fn render_tile(
    node: &ShadingImage,
    channels: &[String],
    tile: V2i,
    context: &Context,
    keep_values: bool,
) -> Result<TileReport> {
    let mut summaries = BTreeMap::new();
    for channel in channels {
        let data = node
            .channel_data(channel, tile, context)
            .with_context(|| format!("failed to shade channel '{channel}' of tile {tile}"))?;
        summaries.insert(
            channel.clone(),
            ChannelSummary::from_values(&data, keep_values),
        );
    }
    Ok(TileReport {
        origin: tile,
        channels: summaries,
    })
}

#[derive(Debug, Serialize)]
pub struct ProgramReport<'a> {
    pub program: &'a GeneratedProgram,
    pub warnings: &'a [BindingWarning],
}

pub fn print_program(loaded: &LoadedConfig) -> Result<()> {
    let node = build_node(&loaded.config)?;
    let channels = node.channels();
    let report = ProgramReport {
        program: channels.program(),
        warnings: channels.warnings(),
    };
    write_json(&report)
}

pub fn print_config(loaded: &LoadedConfig) -> Result<()> {
    let text = loaded
        .config
        .to_toml_string()
        .context("failed to serialise configuration")?;
    print!("{text}");
    Ok(())
}

pub fn print_paths(paths: &AppPaths, loaded: &LoadedConfig) {
    println!("Configuration:");
    println!("  config dir:  {}", paths.config_dir().display());
    println!("  config file: {}", paths.config_file().display());
    match &loaded.source {
        Some(source) => println!("  loaded:      {}", source.display()),
        None => println!("  loaded:      (built-in defaults)"),
    }
}

pub fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value).context("failed to write JSON")?;
    writeln!(out)?;
    Ok(())
}
