use thiserror::Error;

/// Error taxonomy for the engine core. Load errors collapse to `about:blank`
/// at the `Frame`/`Tab` boundary; script, stylesheet and CSP errors are
/// logged and skipped. See the error-handling policy in SPEC_FULL.md §7.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("network error: {0}")]
    Network(String),

    #[error("redirect error: {0}")]
    Redirect(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("blocked by content security policy: {0}")]
    Csp(String),

    #[error("script error: {0}")]
    Script(String),

    /// Never constructed by correct code; layout invariant violations are
    /// bugs, not recoverable conditions.
    #[error("layout invariant violated: {0}")]
    Layout(String),

    #[error("access after shutdown")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, BrowserError>;
