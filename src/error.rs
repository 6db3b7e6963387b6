//! Error taxonomy
//!
//! Every failure surfaced by this crate names the lifecycle [`Stage`] that
//! produced it, so a caller can tell whether to fix configuration, install a
//! dependency, or reorder calls. Nothing here is retried.

use std::{fmt, path::PathBuf};

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Lifecycle stage in which an error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Building or replacing the environment handle
    CreateEnvironment,
    /// Building the policy handle
    CreatePolicy,
    /// Running the optimizer
    Train,
    /// Running evaluation episodes
    Evaluate,
    /// Stepping or resetting a simulation instance
    Simulate,
    /// Saving the policy artifact
    Persist,
    /// Loading the policy artifact
    Restore,
    /// Buffering or encoding frames
    Capture,
    /// Host discovery (executables, game directories)
    Setup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CreateEnvironment => "create-environment",
            Stage::CreatePolicy => "create-policy",
            Stage::Train => "train",
            Stage::Evaluate => "evaluate",
            Stage::Simulate => "simulate",
            Stage::Persist => "persist",
            Stage::Restore => "restore",
            Stage::Capture => "capture",
            Stage::Setup => "setup",
        };
        f.write_str(name)
    }
}

/// Why a required component could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingCause {
    /// The component is not present at all
    NotInstalled,
    /// The component exists but cannot be used as configured
    Misconfigured,
}

impl fmt::Display for MissingCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingCause::NotInstalled => f.write_str("not installed"),
            MissingCause::Misconfigured => f.write_str("misconfigured"),
        }
    }
}

/// Errors produced by the agent controller, the frame capture and the
/// built-in backends
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid option, non-positive count, or incompatible spaces
    #[error("[{stage}] configuration error: {message}")]
    Configuration {
        /// Stage that rejected the configuration
        stage: Stage,
        /// What was wrong
        message: String,
    },

    /// A simulation, rendering, encoding or optimizer backend is unavailable
    #[error("[{stage}] {component} is {cause}: {hint}")]
    DependencyMissing {
        /// Stage that needed the component
        stage: Stage,
        /// Name of the missing component
        component: String,
        /// Not installed vs. misconfigured
        cause: MissingCause,
        /// Actionable diagnostic
        hint: String,
    },

    /// Operation invoked in a lifecycle state where it cannot proceed
    #[error("[{stage}] invalid state: {message}")]
    State {
        /// Stage that was attempted
        stage: Stage,
        /// Why the state does not allow it
        message: String,
    },

    /// Frame dimensions disagree with the buffer's established shape
    #[error(
        "[capture] frame shape mismatch: expected {}x{} (height x width), got {}x{}",
        .expected.0, .expected.1, .actual.0, .actual.1
    )]
    FrameShape {
        /// (height, width) fixed by the first frame
        expected: (u32, u32),
        /// (height, width) of the rejected frame
        actual: (u32, u32),
    },

    /// A persisted policy artifact could not be serialized or parsed
    #[error("[{stage}] policy artifact {}: {source}", .path.display())]
    Artifact {
        /// Persist or restore
        stage: Stage,
        /// Artifact location
        path: PathBuf,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem or process I/O failure
    #[error("[{stage}] {context}: {source}")]
    Io {
        /// Stage performing the I/O
        stage: Stage,
        /// What was being done
        context: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The video encoder rejected a frame or failed to finalize
    #[error("[capture] video encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    /// An environment could not rasterize its state
    #[error("[{stage}] drawing failed: {message}")]
    Draw {
        /// Stage that asked for the frame
        stage: Stage,
        /// Backend diagnostic
        message: String,
    },

    /// A tensor operation in the built-in policy backend failed
    #[error("[{stage}] tensor operation failed: {source}")]
    Tensor {
        /// Stage running the network
        stage: Stage,
        /// Underlying libtorch error
        #[source]
        source: tch::TchError,
    },
}

impl Error {
    /// Build a [`Error::Configuration`]
    pub fn config(stage: Stage, message: impl Into<String>) -> Self {
        Error::Configuration { stage, message: message.into() }
    }

    /// Build a [`Error::State`]
    pub fn state(stage: Stage, message: impl Into<String>) -> Self {
        Error::State { stage, message: message.into() }
    }

    /// Build a [`Error::DependencyMissing`]
    pub fn missing(
        stage: Stage,
        component: impl Into<String>,
        cause: MissingCause,
        hint: impl Into<String>,
    ) -> Self {
        Error::DependencyMissing { stage, component: component.into(), cause, hint: hint.into() }
    }

    /// Build a [`Error::Io`]
    pub fn io(stage: Stage, context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io { stage, context: context.into(), source }
    }

    /// Build a [`Error::Draw`] from any drawing backend error
    pub fn draw(stage: Stage, err: impl fmt::Display) -> Self {
        Error::Draw { stage, message: err.to_string() }
    }

    /// Build a [`Error::Tensor`]
    pub fn tensor(stage: Stage, source: tch::TchError) -> Self {
        Error::Tensor { stage, source }
    }

    /// Lifecycle stage this error belongs to
    pub fn stage(&self) -> Stage {
        match self {
            Error::Configuration { stage, .. }
            | Error::DependencyMissing { stage, .. }
            | Error::State { stage, .. }
            | Error::Artifact { stage, .. }
            | Error::Io { stage, .. }
            | Error::Draw { stage, .. }
            | Error::Tensor { stage, .. } => *stage,
            Error::FrameShape { .. } | Error::Encode(_) => Stage::Capture,
        }
    }

    /// True for [`Error::Configuration`]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }

    /// True for [`Error::State`]
    pub fn is_state(&self) -> bool {
        matches!(self, Error::State { .. })
    }

    /// True for [`Error::DependencyMissing`]
    pub fn is_dependency_missing(&self) -> bool {
        matches!(self, Error::DependencyMissing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_stage() {
        let err = Error::config(Stage::Train, "total_steps must be positive");
        assert_eq!(err.to_string(), "[train] configuration error: total_steps must be positive");
        assert_eq!(err.stage(), Stage::Train);

        let err = Error::missing(
            Stage::Capture,
            "video encoder for '.mp4'",
            MissingCause::NotInstalled,
            "write a .gif file instead",
        );
        assert!(err.to_string().starts_with("[capture] video encoder for '.mp4' is not installed"));
        assert!(err.is_dependency_missing());
    }

    #[test]
    fn test_frame_shape_message() {
        let err = Error::FrameShape { expected: (400, 600), actual: (200, 300) };
        assert_eq!(err.stage(), Stage::Capture);
        assert!(err.to_string().contains("expected 400x600"));
        assert!(err.to_string().contains("got 200x300"));
    }
}
