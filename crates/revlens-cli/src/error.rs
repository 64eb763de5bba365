use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Window(#[from] revlens_core::WindowError),

    #[error(transparent)]
    Engine(#[from] revlens_core::EngineError),

    #[error("strict mode failed: {flag_count} validation flag(s) present")]
    StrictModeViolation { flag_count: usize },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Window(_) => 2,
            Self::Engine(_) => 3,
            Self::StrictModeViolation { .. } => 5,
            Self::Serialization(_) | Self::Io(_) => 10,
        }
    }
}
