//! Error type definitions for the logo service
//!
//! This module defines all error types used throughout the application,
//! providing a single taxonomy that makes fallback decisions and error
//! handling straightforward.

use thiserror::Error;

/// Maximum byte size accepted for any downloaded image.
pub const MAX_DOWNLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Top-level error type for the logo acquisition pipeline
///
/// `NotFound` and `NoLogoFound` are expected outcomes that drive the
/// provider fallback chain; they are not logged as errors. Everything
/// else surfaces to the caller with enough context to identify the
/// failing symbol and stage.
#[derive(Error, Debug)]
pub enum LogoError {
    /// Record or blob absent; drives fallback, never a hard failure
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Every acquisition layer was exhausted for a symbol
    #[error("No provider found a logo for {symbol}")]
    NoProviderFound { symbol: String },

    /// An LLM backend finished without producing a usable result
    #[error("No logo found by {provider} for {symbol}: {reason}")]
    NoLogoFound {
        provider: String,
        symbol: String,
        reason: String,
    },

    /// The agentic loop ran out of turns before a submission
    #[error("Exceeded {max_turns} turns without a logo submission for {symbol}")]
    ExceededMaxTurns { symbol: String, max_turns: usize },

    /// Background color string failed validation
    #[error("Invalid color {value:?}: must be exactly 6 hex digits")]
    InvalidColor { value: String },

    /// Size token failed validation
    #[error("Invalid size {value:?}: must be xs, s, m, l, or xl")]
    InvalidSize { value: String },

    /// Normalization failed for one or more sizes
    #[error("Processing failed for {symbol}: {details}")]
    ProcessingFailed { symbol: String, details: String },

    /// A download exceeded the byte cap
    #[error("Download too large from {url}: exceeds {max_bytes} bytes")]
    DownloadTooLarge { url: String, max_bytes: usize },

    /// The caller's cancellation signal fired
    #[error("Operation cancelled")]
    Cancelled,

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Blob storage I/O errors
    #[error("Storage error at {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Image decode/encode errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// External service errors (non-success API responses and the like)
    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Convenience methods for creating common error types
impl LogoError {
    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>>(resource: R) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a no-logo-found error for a backend outcome
    pub fn no_logo_found<P: Into<String>, S: Into<String>, M: Into<String>>(
        provider: P,
        symbol: S,
        reason: M,
    ) -> Self {
        Self::NoLogoFound {
            provider: provider.into(),
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid color error
    pub fn invalid_color<S: Into<String>>(value: S) -> Self {
        Self::InvalidColor {
            value: value.into(),
        }
    }

    /// Create an invalid size error
    pub fn invalid_size<S: Into<String>>(value: S) -> Self {
        Self::InvalidSize {
            value: value.into(),
        }
    }

    /// Create a processing failed error
    pub fn processing_failed<S: Into<String>, D: Into<String>>(symbol: S, details: D) -> Self {
        Self::ProcessingFailed {
            symbol: symbol.into(),
            details: details.into(),
        }
    }

    /// Create a storage error with path context
    pub fn storage<P: Into<String>>(path: P, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create an external service error
    pub fn external_service<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error is an expected miss that should drive fallback
    /// rather than abort the acquisition chain.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_drives_fallback() {
        assert!(LogoError::not_found("logo for AAPL").is_not_found());
        assert!(!LogoError::Cancelled.is_not_found());
        assert!(!LogoError::NoProviderFound {
            symbol: "AAPL".to_string()
        }
        .is_not_found());
    }

    #[test]
    fn error_messages_carry_context() {
        let err = LogoError::no_logo_found("anthropic", "MSFT", "end_turn without submission");
        let msg = err.to_string();
        assert!(msg.contains("anthropic"));
        assert!(msg.contains("MSFT"));

        let err = LogoError::DownloadTooLarge {
            url: "https://example.com/big.png".to_string(),
            max_bytes: MAX_DOWNLOAD_BYTES,
        };
        assert!(err.to_string().contains("10485760"));
    }
}
