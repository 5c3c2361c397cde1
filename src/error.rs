//! Error types for `stagehand`.
//!
//! One enum per subsystem, aggregated into [`StagehandError`]. Cancellation
//! is modelled as its own variant rather than an error wrapper: it is the
//! expected outcome of a cancelled timer or transition and is swallowed
//! (logged at debug) by whichever boundary requested it.

use thiserror::Error;

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `stagehand` operations.
#[derive(Debug, Error)]
pub enum StagehandError {
    /// Configuration or phase-registration error. Fatal at startup.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Phase state machine error.
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// Resource acquisition or release error.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Event bus listener error.
    #[error(transparent)]
    Event(#[from] EventError),

    /// Session record persistence error.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// An operation observed its cancellation scope and unwound.
    ///
    /// Not a failure: the boundary that requested cancellation is expected
    /// to swallow this variant.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StagehandError {
    /// Whether this error is the expected outcome of a cancellation request.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading, validation and phase-registration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file.
        path: std::path::PathBuf,
    },

    /// YAML parsing failed.
    #[error("parse error in {path}: {message}")]
    Parse {
        /// Path to the configuration file.
        path: std::path::PathBuf,
        /// Error message from the parser.
        message: String,
    },

    /// Configuration validation failed.
    #[error("validation failed for {path}")]
    Validation {
        /// Origin of the configuration (file path or `"<inline>"`).
        path: String,
        /// Validation issues found.
        issues: Vec<ValidationIssue>,
    },

    /// `register_phases` was called more than once.
    #[error("phases already registered")]
    PhasesAlreadyRegistered,

    /// Two phases were registered under the same identity.
    #[error("duplicate phase id: {id}")]
    DuplicatePhase {
        /// The colliding phase identity.
        id: String,
    },
}

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g. `"spawn.interval_ms"`).
    pub path: String,
    /// Description of the issue.
    pub message: String,
    /// Severity of the issue.
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Prevents the configuration from being used.
    Error,
    /// Suspicious but usable.
    Warning,
}

// ============================================================================
// Phase Errors
// ============================================================================

/// Phase state machine errors.
#[derive(Debug, Error)]
pub enum PhaseError {
    /// Transition requested to a phase that was never registered.
    ///
    /// The current phase is left unchanged.
    #[error("unknown phase: {0}")]
    Unknown(String),

    /// A phase reported a failure from its own enter or exit logic.
    #[error("phase '{phase}' failed during {stage}: {message}")]
    Lifecycle {
        /// The phase that failed.
        phase: String,
        /// `"enter"` or `"exit"`.
        stage: &'static str,
        /// Failure description.
        message: String,
    },
}

// ============================================================================
// Resource Errors
// ============================================================================

/// Resource provider and scope errors.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The provider failed to resolve a resource key.
    #[error("failed to load resource '{key}': {message}")]
    Load {
        /// The requested resource key.
        key: String,
        /// Provider failure description.
        message: String,
    },

    /// The provider failed to build an instance from a loaded resource.
    #[error("failed to instantiate from resource '{key}': {message}")]
    Instantiate {
        /// Key of the backing resource.
        key: String,
        /// Provider failure description.
        message: String,
    },

    /// The provider failed to release a resource or instance.
    #[error("release failed: {0}")]
    Release(String),

    /// The scope was disposed before or during the operation.
    #[error("resource scope already disposed")]
    ScopeDisposed,
}

// ============================================================================
// Event Errors
// ============================================================================

/// Event bus errors.
///
/// A listener failure never propagates to the publisher; the bus reports it
/// and continues delivery. This type exists so listeners have a concrete
/// error to return.
#[derive(Debug, Error)]
pub enum EventError {
    /// A listener callback failed.
    #[error("listener failed: {0}")]
    Listener(String),
}

// ============================================================================
// Persistence Errors
// ============================================================================

/// Session record persistence errors.
#[derive(Debug, Error)]
pub enum PersistError {
    /// I/O error reading or writing the record.
    #[error("record I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded.
    #[error("record encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `stagehand` operations.
pub type Result<T> = std::result::Result<T, StagehandError>;

// ============================================================================
// Tests
// ============================================================================
