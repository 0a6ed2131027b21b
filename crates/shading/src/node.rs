//! A small host-independent model of a dependency-graph compute node.
//!
//! A host graph asks a node which outputs an input change invalidates, hashes
//! outputs to decide whether a cached value is still valid, and computes the
//! outputs whose hash it has not seen.
use std::sync::Arc;

use crate::context::Context;
use crate::error::ShadingError;
use crate::hash::Digest;
use crate::image::{Box2i, Format, V2i};
use crate::result::ShadingResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plug {
    Shader,
    DefaultFormat,
    InFormat,
    InDataWindow,
    InChannelNames,
    InChannelData,
    InDeep,
    InSampleOffsets,
    Shading,
    OutFormat,
    OutDataWindow,
    OutChannelNames,
    OutChannelData,
    OutDeep,
    OutSampleOffsets,
}

impl Plug {
    pub fn is_output(self) -> bool {
        matches!(
            self,
            Plug::Shading
                | Plug::OutFormat
                | Plug::OutDataWindow
                | Plug::OutChannelNames
                | Plug::OutChannelData
                | Plug::OutDeep
                | Plug::OutSampleOffsets
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Cached,
    /// The host should not store the value, typically because it is a view
    /// into another cached value.
    Uncached,
}

/// Everything an output may be evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub context: &'a Context,
    pub tile_origin: V2i,
    pub channel_name: Option<&'a str>,
}

impl<'a> Request<'a> {
    pub fn global(context: &'a Context) -> Self {
        Self {
            context,
            tile_origin: V2i::default(),
            channel_name: None,
        }
    }

    pub fn tile(context: &'a Context, tile_origin: V2i) -> Self {
        Self {
            context,
            tile_origin,
            channel_name: None,
        }
    }

    pub fn channel(context: &'a Context, channel_name: &'a str, tile_origin: V2i) -> Self {
        Self {
            context,
            tile_origin,
            channel_name: Some(channel_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlugValue {
    Shading(Arc<ShadingResult>),
    Format(Format),
    DataWindow(Box2i),
    ChannelNames(Vec<String>),
    ChannelData(Arc<Vec<f32>>),
    Deep(bool),
    SampleOffsets(Arc<Vec<i32>>),
}

pub trait ComputeNode {
    /// Outputs invalidated by a change to `input`.
    fn affects(&self, input: Plug) -> Vec<Plug>;

    fn hash(&self, output: Plug, request: &Request<'_>) -> Result<Digest, ShadingError>;

    fn compute(&self, output: Plug, request: &Request<'_>) -> Result<PlugValue, ShadingError>;

    fn cache_policy(&self, _output: Plug) -> CachePolicy {
        CachePolicy::Cached
    }
}
