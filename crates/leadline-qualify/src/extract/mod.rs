//! Slot extraction from caller utterances.
//!
//! Strategies implement [`SlotExtractor`]. The [`ExtractorChain`] tries them
//! in order and returns the first success; the pattern strategy never fails,
//! so the chain always yields a (possibly empty) result.

pub mod model;
pub mod numbers;
pub mod pattern;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::slots::{sanitize, Slots};

pub use model::{ModelExtractor, ModelExtractorConfig};
pub use pattern::PatternExtractor;

/// One way of turning an utterance into slot values.
#[async_trait]
pub trait SlotExtractor: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Extracts the facts stated in `utterance`. `prior` is what the call
    /// already knows, for strategies that interpret bare answers.
    async fn extract(&self, utterance: &str, prior: &Slots) -> Result<Slots, ExtractError>;
}

/// Result of running the chain on one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Name of the strategy that produced `slots`.
    pub strategy: &'static str,
    pub slots: Slots,
}

/// Ordered list of strategies with fall-through on error.
#[derive(Clone)]
pub struct ExtractorChain {
    strategies: Vec<Arc<dyn SlotExtractor>>,
}

impl ExtractorChain {
    pub fn new(strategies: Vec<Arc<dyn SlotExtractor>>) -> Self {
        Self { strategies }
    }

    /// Pattern matching only.
    pub fn pattern_only() -> Self {
        Self::new(vec![Arc::new(PatternExtractor::new())])
    }

    /// Model first, pattern matching as the fallback.
    pub fn with_model(config: ModelExtractorConfig) -> Result<Self, ExtractError> {
        let model = ModelExtractor::new(config)?;
        Ok(Self::new(vec![
            Arc::new(model),
            Arc::new(PatternExtractor::new()),
        ]))
    }

    /// Runs strategies in order until one succeeds.
    ///
    /// The winning result is sanitized against `prior` before it is returned.
    pub async fn extract(&self, utterance: &str, prior: &Slots) -> Extraction {
        for strategy in &self.strategies {
            match strategy.extract(utterance, prior).await {
                Ok(slots) => {
                    debug!(strategy = strategy.name(), "extraction succeeded");
                    return Extraction {
                        strategy: strategy.name(),
                        slots: sanitize(prior, slots),
                    };
                }
                Err(ExtractError::Disabled(reason)) => {
                    debug!(strategy = strategy.name(), %reason, "extractor skipped");
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "extractor failed, falling back");
                }
            }
        }
        Extraction {
            strategy: "none",
            slots: Slots::default(),
        }
    }
}

impl Default for ExtractorChain {
    fn default() -> Self {
        Self::pattern_only()
    }
}

impl std::fmt::Debug for ExtractorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("ExtractorChain").field("strategies", &names).finish()
    }
}
