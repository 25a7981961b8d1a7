//! Error handling for flowhook
//!
//! This module defines the error taxonomy shared by listeners, breakpoints and
//! configuration, plus a Result alias for use throughout the crate.
//!
//! Only two kinds of error ever travel through a stage hook: breakpoint
//! condition evaluation errors, which must stop evaluation visibly, and channel
//! errors surfaced by explicit observer calls. Resource errors (files, sockets)
//! are logged by the listener that owns the resource and never reach the
//! pipeline.

use thiserror::Error;

/// Main error type for flowhook operations
#[derive(Error, Debug)]
pub enum FlowHookError {
    /// Errors found while validating an instrumentation configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote listener port outside of 1-65535
    #[error("Invalid port {0}: must be between 1 and 65535")]
    InvalidPort(u32),

    /// A condition, watch or scope expression failed to compile
    #[error("Invalid expression '{expression}': {message}")]
    Expression { expression: String, message: String },

    /// A breakpoint condition failed while being evaluated against an element
    #[error("Condition evaluation failed at {element}: {message}")]
    Condition { element: String, message: String },

    /// Errors related to observer channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FlowHookError>,
    },
}

impl FlowHookError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FlowHookError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create an expression compile error from a Rhai parse error
    pub fn from_parse_error(expression: &str, err: rhai::ParseError) -> Self {
        FlowHookError::Expression {
            expression: expression.to_string(),
            message: err.to_string(),
        }
    }

    /// Create a condition evaluation error from a Rhai runtime error
    pub fn from_eval_error(element: &str, err: Box<rhai::EvalAltResult>) -> Self {
        FlowHookError::Condition {
            element: element.to_string(),
            message: err.to_string(),
        }
    }

    /// Whether this error (or the error it wraps) is a configuration problem
    pub fn is_config_error(&self) -> bool {
        match self {
            FlowHookError::Config(_)
            | FlowHookError::InvalidPort(_)
            | FlowHookError::Expression { .. } => true,
            FlowHookError::WithContext { source, .. } => source.is_config_error(),
            _ => false,
        }
    }
}

/// Result type alias for flowhook operations
pub type Result<T> = std::result::Result<T, FlowHookError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| FlowHookError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| FlowHookError::Io(e).with_context(f()))
    }
}
