//! Error types for vision providers and provider chains.

use crate::domain::DomainError;

/// Boxed underlying cause carried by a provider failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by vision providers.
///
/// A single adapter failure is always [`VisionError::Provider`], whatever the
/// cause (network, quota, malformed image, authentication). Whether to try
/// another backend is decided by the fallback chain, not here.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("vision provider '{provider}' failed: {message}")]
    Provider {
        provider: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("all {} vision providers failed: {}", .attempts.len(), summarize(.attempts))]
    AllProvidersFailed { attempts: Vec<ProviderFailure> },

    #[error("vision analysis timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("provider chain must contain at least one provider")]
    EmptyChain,
}

/// One failed attempt inside a provider chain, in chain order.
#[derive(Debug)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: VisionError,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

fn summarize(attempts: &[ProviderFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl VisionError {
    /// Failure without an underlying error value.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Failure wrapping an underlying error.
    pub fn provider_with_source(
        provider: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// A provider returned a confidence outside `[0, 100]`.
    pub fn malformed_score(provider: impl Into<String>, err: DomainError) -> Self {
        Self::provider_with_source(provider, "response contained an invalid confidence", err)
    }

    /// Attempts recorded by an exhausted chain; empty for other variants.
    pub fn attempts(&self) -> &[ProviderFailure] {
        match self {
            Self::AllProvidersFailed { attempts } => attempts,
            _ => &[],
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type for vision operations.
pub type VisionResult<T> = std::result::Result<T, VisionError>;
