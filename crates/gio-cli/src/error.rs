use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] gio_core::ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Schema(#[from] gio_core::SchemaError),

    #[error(transparent)]
    Dispatch(#[from] gio_core::DispatchError),

    #[error(transparent)]
    Config(#[from] gio_core::ConfigError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Command(_) => 2,
            Self::Schema(_) => 3,
            Self::Dispatch(_) => 4,
            Self::Config(_) => 5,
            Self::Serialization(_) => 10,
            Self::Io(_) => 10,
        }
    }
}
