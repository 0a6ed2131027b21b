use crate::node::Plug;

#[derive(Debug, thiserror::Error)]
pub enum ShadingError {
    #[error("tile origin ({x}, {y}) is not aligned to the {size}px tile grid")]
    TileAlignment { x: i32, y: i32, size: i32 },
    #[error("upstream image has no channel '{0}'")]
    MissingChannel(String),
    #[error("sample offsets for tile ({x}, {y}) are malformed: {reason}")]
    MalformedOffsets { x: i32, y: i32, reason: String },
    #[error("{samples} samples per pixel exceeds the limit of {max}")]
    SampleCount { samples: u32, max: u32 },
    #[error("attribute '{name}' has {actual} values but there are {expected} shading points")]
    AttributeLength {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("shading output '{name}' has {actual} values but there are {expected} shading points")]
    MalformedOutput {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("shading engine failed: {message}")]
    Engine { message: String },
    #[error("failed to compile channel program: {0}")]
    Compile(String),
    #[error("request for {0:?} carries no channel name")]
    MissingChannelName(Plug),
    #[error("plug {0:?} is not an output")]
    NotAnOutput(Plug),
}

impl ShadingError {
    pub(crate) fn engine(err: anyhow::Error) -> Self {
        ShadingError::Engine {
            message: format!("{err:#}"),
        }
    }
}
