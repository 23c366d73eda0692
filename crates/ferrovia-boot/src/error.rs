//! Error types for boot content generation

use thiserror::Error;

/// Error type for boot config patching and kickstart rendering
#[derive(Debug, Error)]
pub enum BootError {
    /// boot.cfg has no `kernelopt=` line to extend
    #[error("boot configuration has no kernelopt line")]
    MissingKernelopt,

    #[error("boot configuration is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::string::FromUtf8Error),

    /// A kickstart override is not valid base64 or not UTF-8
    #[error("invalid kickstart override: {0}")]
    InvalidOverride(String),

    /// Template failed to parse
    #[error("template syntax error: {0}")]
    TemplateSyntax(String),

    /// Template failed to render
    #[error("template error: {0}")]
    TemplateError(#[from] minijinja::Error),

    #[error(transparent)]
    Model(#[from] ferrovia_common::Error),
}

/// Result type for boot content generation
pub type Result<T> = std::result::Result<T, BootError>;
