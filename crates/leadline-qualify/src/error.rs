use thiserror::Error;

/// Errors raised by a single extraction strategy.
///
/// None of these reach the conversation: the extractor chain logs them and
/// falls through to the next strategy.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("extractor request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("extractor returned malformed output: {0}")]
    Malformed(String),

    #[error("extractor upstream error: {0}")]
    Upstream(String),

    #[error("extractor disabled: {0}")]
    Disabled(String),
}
