//! Per-tile shading of images with a pluggable shading engine.
//!
//! The flow for one tile is:
//!
//! ```text
//!   ImageSource ──▶ build_points() ──▶ ShadingEngine::shade() ──▶ ShadingResult
//!        │                                                             │
//!        └── hash_shading() ──▶ Digest ──▶ ShadingCache ◀──────────────┘
//!                                               │
//!                    channel_names() / channel_data() ◀── ShadingImage
//! ```
//!
//! `ShadingImage` is the node: it owns the cache, the engine (either connected
//! directly or compiled from a `ChannelBindingSet`) and the upstream source,
//! and answers the image queries a host graph makes against its outputs.

pub mod bindings;
pub mod builtin;
pub mod cache;
pub mod codegen;
pub mod context;
pub mod engine;
pub mod error;
pub mod hash;
pub mod image;
pub mod node;
pub mod points;
pub mod result;
pub mod shading_image;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use bindings::{BindingValue, ChannelBinding, ChannelBindingSet};
pub use builtin::{BindingCompiler, BindingEngine, ProgramCompiler};
pub use cache::{CacheStats, ShadingCache, DEFAULT_CACHE_CAPACITY};
pub use codegen::{generate_program, BindingWarning, GeneratedProgram, Parameter, ParameterKind};
pub use context::{Context, ContextValue};
pub use engine::{ShadeOutputs, ShadeValue, ShadingEngine};
pub use error::ShadingError;
pub use hash::{Digest, DigestBuilder};
pub use image::{tile_origin, tile_pixels, Box2i, Format, V2i, TILE_SIZE};
pub use node::{CachePolicy, ComputeNode, Plug, PlugValue, Request};
pub use points::{build_points, ShadingPoints, UvMapping};
pub use result::ShadingResult;
pub use shading_image::ShadingImage;
pub use source::{ConstantImage, ImageSource, MemoryImage, MAX_DEEP_SAMPLES};
