use thiserror::Error;

/// Errors that abort display list generation. Any of these means the output
/// produced so far is not valid and must be discarded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    /// A position or texture coordinate does not fit in a signed 16-bit
    /// vertex field after scaling.
    #[error("model too large: {value} does not fit in a 16-bit vertex field")]
    ModelTooLarge { value: f32 },

    /// A face references bones that cannot be drawn with a single matrix
    /// transition.
    #[error("face {face} of mesh \"{mesh}\" is not supported: {reason}")]
    UnsupportedTopology {
        mesh: String,
        face: usize,
        reason: String,
    },

    /// The rig is deeper than the hardware matrix stack.
    #[error("matrix stack depth exceeded: bone \"{bone}\" needs depth {depth}, max is {max}")]
    MatrixStackDepthExceeded {
        bone: String,
        depth: usize,
        max: usize,
    },

    #[error("failed to format output: {0}")]
    Format(#[from] std::fmt::Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;
