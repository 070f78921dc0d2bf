use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Config file not found. Looked in:\n\
        - current directory: occigate.local.kdl, occigate.kdl\n\
        - ./.occigate/ directory\n\
        - ~/.config/occigate/occigate.kdl\n\
        Set OCCIGATE_CONFIG to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("KDL parse error: {0}")]
    Kdl(#[from] kdl::KdlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
