use thiserror::Error;

/// Errors that can occur while resolving, installing, or operating hooks.
///
/// All of these are local and non-fatal by design: a failed resolution or
/// install leaves the specific entry point unhooked, and the rest of the
/// system keeps running with reduced coverage. The worst case under total
/// failure is full passthrough of the real captured audio.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("library unavailable: {0}")]
    LibraryUnavailable(String),

    #[error("symbol missing: {0}")]
    SymbolMissing(String),

    #[error("dispatch table resolution failed: {0}")]
    ResolutionFailed(String),

    #[error("patch rejected: {0}")]
    PatchRejected(String),

    #[error("provider already bound")]
    ProviderAlreadyBound,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Failure inside the external PCM provider call.
///
/// Never propagated across an intercepted call boundary; the synthesis
/// bridge degrades to silence instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("runtime attach failed: {0}")]
    AttachFailed(String),

    #[error("provider call failed: {0}")]
    CallFailed(String),
}
