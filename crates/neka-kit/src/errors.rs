use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("File not found: {path}")]
    #[diagnostic(
        code(file::not_found),
        help("Make sure the file exists and the path is correct")
    )]
    FileNotFound { path: Utf8PathBuf },

    #[error("Not a kit payload: {path}")]
    #[diagnostic(
        code(payload::invalid),
        help("Expected the page's __NEXT_DATA__ JSON, an object wrapping it under 'next_data', or a bare [vocabulary, root] array")
    )]
    InvalidPayload {
        path: Utf8PathBuf,
        #[source]
        source: neka_vocab::DecodeError,
    },

    #[error("Kit could not be processed")]
    #[diagnostic(
        code(kit::failed),
        help("Check that the payload decompresses to a kit with a 'data.parts' array")
    )]
    KitFailed {
        #[source]
        source: neka_kit::Error,
    },

    #[error("Not a kit folder: {path}")]
    #[diagnostic(
        code(kit::not_found),
        help("Point to a folder created by 'neka-kit import' (it contains metadata.json)")
    )]
    KitNotFound { path: Utf8PathBuf },

    #[error("Unknown configuration key: {key}")]
    #[diagnostic(
        code(config::unknown_key),
        help("Valid keys are image_host, output_dir, max_retries, timeout_secs and workers")
    )]
    UnknownConfigKey { key: String },

    #[error("Invalid value for {key}: {value}")]
    #[diagnostic(code(config::invalid_value), help("The value must be a non-negative integer"))]
    InvalidConfigValue { key: String, value: String },

    #[error("IO operation failed")]
    #[diagnostic(code(io::operation_failed))]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl CliError {
    pub fn file_not_found(path: Utf8PathBuf) -> Self {
        Self::FileNotFound { path }
    }

    pub fn invalid_payload(path: Utf8PathBuf, source: neka_vocab::DecodeError) -> Self {
        Self::InvalidPayload { path, source }
    }

    pub fn kit_failed(source: neka_kit::Error) -> Self {
        Self::KitFailed { source }
    }

    pub fn kit_not_found(path: Utf8PathBuf) -> Self {
        Self::KitNotFound { path }
    }

    pub fn unknown_config_key(key: String) -> Self {
        Self::UnknownConfigKey { key }
    }

    pub fn invalid_config_value(key: String, value: String) -> Self {
        Self::InvalidConfigValue { key, value }
    }
}
