//! Error handling for pppackage
//!
//! This module provides the domain error type [`PpError`] and the
//! user-facing presentation layer built around [`ErrorContext`].
//!
//! # Error Categories
//!
//! - **Configuration errors**: malformed configuration or an unknown plugin name
//! - **Epoch changes**: a repository changed while a cached read was in flight
//! - **No model**: the requirements are unsatisfiable
//! - **Backend failures**: a repository, installer or containerizer call failed
//! - **Build failures**: a package product could not be produced
//! - **Invariant violations**: corrupt caches or inconsistent repository answers
//! - **Aggregates**: several concurrent failures reported together
//!
//! Application code propagates [`anyhow::Error`] and attaches context with
//! `.with_context(..)`. The CLI converts the final error with
//! [`user_friendly_error`] and prints it with [`ErrorContext::display`].
//!
//! ```rust,no_run
//! use pppackage::core::{PpError, user_friendly_error};
//!
//! let error = anyhow::Error::from(PpError::ConfigError {
//!     message: "no repositories configured".to_string(),
//! });
//! user_friendly_error(error).display();
//! ```

use crate::models::Requirement;
use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Exit code for unsatisfiable requirements.
pub const EXIT_NO_MODEL: i32 = 2;

/// Exit code for every other failure.
pub const EXIT_FAILURE: i32 = 1;

/// The main error type for pppackage operations.
#[derive(Error, Debug, Clone)]
pub enum PpError {
    /// Configuration or input is malformed
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// A plugin name is not registered
    ///
    /// # Fields
    /// - `kind`: plugin category ("repository driver", "translator", "installer", "generator")
    /// - `name`: the name that failed to resolve
    #[error("Unknown {kind} '{name}'")]
    UnknownPlugin {
        /// Plugin category
        kind: String,
        /// Requested name
        name: String,
    },

    /// A repository's epoch changed while its data was being read
    ///
    /// The in-flight cache write is discarded. The caller is expected to
    /// surface this as a resolution failure rather than retry.
    #[error("Repository '{repository}' changed during read (epoch {expected} became {found})")]
    EpochChanged {
        /// Repository display name
        repository: String,
        /// Epoch observed at the start of the read
        expected: String,
        /// Epoch observed at the end of the read
        found: String,
    },

    /// No assignment satisfies the requirements
    #[error("No model found for the following requirements:{}", format_requirements(.requirements))]
    NoModel {
        /// Top-level requirements that could not be satisfied together
        requirements: Vec<Requirement>,
    },

    /// A backend call (driver, installer, containerizer) reported failure
    #[error("{operation} failed: {message}")]
    BackendCommandFailure {
        /// The operation that failed
        operation: String,
        /// Error output of the backend
        message: String,
    },

    /// A product could not be built or fetched
    #[error("Failed to build product of '{package}': {reason}")]
    BuildFailed {
        /// Package variable
        package: String,
        /// Reason for the failure
        reason: String,
    },

    /// An internal consistency check failed
    #[error("Internal invariant violated: {message}")]
    InvariantViolation {
        /// What was inconsistent
        message: String,
    },

    /// The dependency graph contains a cycle
    #[error("Circular dependency detected: {chain}")]
    CircularDependency {
        /// The cycle, rendered as `a -> b -> a`
        chain: String,
    },

    /// A remote repository answered with malformed data
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the malformed data
        message: String,
    },

    /// Several concurrent operations failed
    #[error("{} operations failed:{}", .errors.len(), format_errors(.errors))]
    Aggregate {
        /// Rendered error chains of every failure
        errors: Vec<String>,
    },
}

fn format_requirements(requirements: &[Requirement]) -> String {
    requirements.iter().map(|r| format!("\n  {r}")).collect()
}

fn format_errors(errors: &[String]) -> String {
    errors.iter().map(|e| format!("\n  {}", e.replace('\n', "\n    "))).collect()
}

impl PpError {
    /// Builds a [`PpError::Aggregate`] from several errors.
    pub fn aggregate(errors: &[anyhow::Error]) -> Self {
        Self::Aggregate {
            errors: errors.iter().map(|e| format!("{e:#}")).collect(),
        }
    }
}

/// Process exit code for `error`.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<PpError>() {
        Some(PpError::NoModel {
            ..
        }) => EXIT_NO_MODEL,
        _ => EXIT_FAILURE,
    }
}

/// Error context wrapper that provides user-friendly error information
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: PpError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: PpError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// [`PpError`] values anywhere in the chain get tailored suggestions. I/O,
/// TOML and JSON errors are recognised next. Everything else is shown with
/// its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(pp_error) = error.chain().find_map(|cause| cause.downcast_ref::<PpError>()) {
        let context = create_error_context(pp_error.clone());
        let outer = error.to_string();
        return if outer == pp_error.to_string() {
            context
        } else {
            context.with_details(outer)
        };
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::PermissionDenied {
            return ErrorContext::new(PpError::BackendCommandFailure {
                operation: "File access".to_string(),
                message: io_error.to_string(),
            })
            .with_suggestion("Check ownership of the data directory and the destination root");
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(PpError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of the configuration file");
    }

    if let Some(json_error) = error.downcast_ref::<serde_json::Error>() {
        return ErrorContext::new(PpError::ConfigError {
            message: json_error.to_string(),
        })
        .with_suggestion("Check that the input document is valid JSON");
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(PpError::BackendCommandFailure {
        operation: "Operation".to_string(),
        message,
    })
}

fn create_error_context(error: PpError) -> ErrorContext {
    match &error {
        PpError::ConfigError {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the configuration file passed with --config or PPPACKAGE_CONFIG"),
        PpError::UnknownPlugin {
            kind,
            ..
        } => {
            let suggestion = format!("Register the {kind} in the configuration file");
            ErrorContext::new(error).with_suggestion(suggestion)
        }
        PpError::EpochChanged {
            ..
        } => ErrorContext::new(error)
            .with_details("The repository was updated while it was being read; nothing was cached")
            .with_suggestion("Run the command again once the repository update has finished"),
        PpError::NoModel {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Relax the listed requirements or add repositories that provide them"),
        PpError::CircularDependency {
            ..
        } => ErrorContext::new(error)
            .with_details("Packages selected together must not depend on each other in a cycle"),
        PpError::InvariantViolation {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Clear the data directory caches and retry; report the issue if it persists"),
        _ => ErrorContext::new(error),
    }
}
