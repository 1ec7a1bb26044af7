//! Error types for the conductor command model and session state.

use crate::command::CommandKind;

/// Errors raised while interpreting operator input or encoding commands.
///
/// None of these ever reach the network layer: they are resolved by the
/// dispatcher before a stream is opened.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A command was given the wrong number of positional arguments.
    #[error("`{kind}` takes {expected} argument(s), got {actual}")]
    ArgumentCount {
        kind: CommandKind,
        expected: usize,
        actual: usize,
    },

    /// A field that must be an integer could not be parsed.
    #[error("invalid {field} `{value}`: the value must be a number")]
    NotANumber { field: &'static str, value: String },

    /// The externally reachable image of a pod is not one of its images.
    #[error("external image `{external}` must match one of the pod images [{}]", .images.join(","))]
    ExternalImageNotListed {
        external: String,
        images: Vec<String>,
    },

    /// A peer-addressed command was issued before any host was selected.
    #[error("select the host on which you want to {}", .kind.purpose())]
    NoPeerSelected { kind: CommandKind },

    /// `use` was given an index outside the peer directory.
    #[error("no host with index {index}: {len} host(s) known")]
    IndexOutOfRange { index: i64, len: usize },

    /// The command document could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A command document could not be parsed.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl CoreError {
    /// Whether the error stems from malformed operator input.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            Self::ArgumentCount { .. } | Self::NotANumber { .. } | Self::ExternalImageNotListed { .. }
        )
    }
}
