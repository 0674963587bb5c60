//! Moderation gate.
//!
//! Every incoming message is classified before any session work happens:
//!
//! | Outcome | Condition | Effect |
//! |---------|-----------|--------|
//! | Blocked | flagged and a high-risk category is set | turn rejected |
//! | Warned  | a soft-risk category is set | reply gets a cautionary prefix |
//! | Clean   | otherwise | no effect |
//!
//! The gate fails open: if the moderation service errors, the message is let
//! through unmoderated and the failure is logged.

use crate::provider::ProviderError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Categories that reject the message when the result is flagged.
pub const BLOCK_CATEGORIES: &[&str] = &["violence", "self_harm", "harassment", "hateful"];

/// Categories that attach a soft warning to the reply.
pub const WARN_CATEGORIES: &[&str] = &["sexual", "political"];

/// Prefix attached to replies for soft-risk messages.
pub const SOFT_WARNING: &str =
    "⚠️ Your message may contain sensitive content. I will respond carefully.";

/// Raw output of a moderation service.
#[derive(Debug, Clone, Default)]
pub struct ModerationResult {
    pub flagged: bool,
    pub categories: HashMap<String, bool>,
}

/// A remote moderation capability.
#[async_trait]
pub trait ModerationProvider: Send + Sync {
    async fn moderate(&self, model: &str, input: &str) -> Result<ModerationResult, ProviderError>;
}

/// Outcome of the pre-check for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// False means the turn must be rejected.
    pub safe: bool,
    /// Non-empty means the reply is prefixed with this text.
    pub warning: String,
}

impl Verdict {
    pub fn clean() -> Self {
        Self {
            safe: true,
            warning: String::new(),
        }
    }

    pub fn blocked() -> Self {
        Self {
            safe: false,
            warning: String::new(),
        }
    }

    pub fn warned(warning: impl Into<String>) -> Self {
        Self {
            safe: true,
            warning: warning.into(),
        }
    }

    pub fn has_warning(&self) -> bool {
        !self.warning.is_empty()
    }
}

/// Map provider category names onto the gate's vocabulary:
/// `self-harm/intent` → `self_harm`, `hate` → `hateful`.
fn normalize_category(name: &str) -> String {
    let parent = name.split('/').next().unwrap_or(name);
    let normalized = parent.trim().to_ascii_lowercase().replace('-', "_");
    if normalized == "hate" {
        "hateful".to_string()
    } else {
        normalized
    }
}

impl ModerationResult {
    /// Whether any category in `set` is true, after normalisation.
    fn any_in(&self, set: &[&str]) -> bool {
        self.categories
            .iter()
            .filter(|(_, hit)| **hit)
            .any(|(name, _)| set.contains(&normalize_category(name).as_str()))
    }

    /// Classify this result.
    pub fn verdict(&self) -> Verdict {
        if self.flagged && self.any_in(BLOCK_CATEGORIES) {
            Verdict::blocked()
        } else if self.any_in(WARN_CATEGORIES) {
            Verdict::warned(SOFT_WARNING)
        } else {
            Verdict::clean()
        }
    }
}

/// Wraps a [`ModerationProvider`] with the block/warn policy.
#[derive(Clone)]
pub struct ModerationGate {
    provider: Option<Arc<dyn ModerationProvider>>,
    model: String,
}

impl ModerationGate {
    pub fn new(provider: Arc<dyn ModerationProvider>, model: impl Into<String>) -> Self {
        Self {
            provider: Some(provider),
            model: model.into(),
        }
    }

    /// A gate that lets every message through.
    pub fn disabled() -> Self {
        Self {
            provider: None,
            model: String::new(),
        }
    }

    /// Classify `text`. Never fails.
    pub async fn check(&self, text: &str) -> Verdict {
        let Some(provider) = &self.provider else {
            return Verdict::clean();
        };

        match provider.moderate(&self.model, text).await {
            Ok(result) => {
                let verdict = result.verdict();
                if !verdict.safe {
                    tracing::info!(model = %self.model, "Message blocked by moderation");
                } else if verdict.has_warning() {
                    tracing::debug!(model = %self.model, "Message soft-flagged by moderation");
                }
                verdict
            }
            Err(e) => {
                tracing::warn!(error = %e, "Moderation check failed, allowing message");
                Verdict::clean()
            }
        }
    }
}
