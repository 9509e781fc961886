use thiserror::Error;

/// Problems with the requested stream combination. These are reported before
/// any buffers or temporary files exist.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("--video or --audio flags needed")]
    NoStreams,

    #[error("if set --video then --width and --height options needed")]
    MissingDimensions,

    #[error("--{0} must be greater than zero")]
    Zero(&'static str),
}
