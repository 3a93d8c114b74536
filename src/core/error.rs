//! Error taxonomy for APM.
//!
//! [`ApmError`] enumerates every failure mode named in the error handling
//! design: reference parsing, host support, fetching, resolution, and
//! filesystem I/O. [`ErrorContext`] wraps an [`ApmError`] with an optional
//! suggestion and details line for CLI display, following the same
//! error/details/suggestion split used throughout this crate's ancestry.

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// All failure modes the core pipeline can produce.
#[derive(Error, Debug)]
pub enum ApmError {
    /// A dependency reference string could not be parsed.
    #[error("Invalid dependency reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// The reference names a host that is not one of the three supported
    /// families and does not match `GITHUB_HOST`.
    #[error("Unsupported host '{host}'")]
    UnsupportedHost { host: String },

    /// A virtual path's final segment has a file extension that is not one
    /// of the four permitted typed extensions.
    #[error("Invalid virtual path extension in '{virtual_path}'")]
    InvalidVirtualExtension { virtual_path: String },

    /// The remote host could not be reached at all.
    #[error("Cannot reach host for '{repo}'")]
    Unreachable { repo: String },

    /// The remote host demanded authentication we didn't have.
    #[error("Authentication required for '{repo}'")]
    AuthRequired { repo: String },

    /// The requested branch, tag, or commit does not exist.
    #[error("Ref '{reference}' not found in '{repo}'")]
    NoSuchRef { repo: String, reference: String },

    /// A requested file path does not exist in the resolved commit.
    #[error("Path '{path}' not found in '{repo}'")]
    NotFound { repo: String, path: String },

    /// Two independent references resolved to the same canonical key with
    /// different refs; the dependency was still installed once.
    #[error("Cycle detected while installing '{key}'")]
    CycleDetected { key: String },

    /// A package manifest is missing a required field.
    #[error("Manifest for '{package}' is missing required field '{field}'")]
    ManifestMissingField { package: String, field: String },

    /// Frontmatter failed to parse as YAML; an empty metadata map was
    /// substituted and this is surfaced only as a warning by callers.
    #[error("Malformed frontmatter in '{path}': {reason}")]
    FrontmatterMalformed { path: String, reason: String },

    /// A file would not have received an instruction it matches by upward
    /// traversal; corrected automatically by placing a root-level copy.
    #[error("Coverage violation for instruction '{instruction}' on '{file}'")]
    CoverageViolation { instruction: String, file: String },

    /// Filesystem operation failed.
    #[error("I/O error during {operation} at '{path}': {source}")]
    IoError {
        operation: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// YAML (de)serialization failed outside the frontmatter-tolerant path
    /// (e.g. `apm.yml`, `apm.lock`, global config).
    #[error("YAML error in '{file}': {source}")]
    YamlError {
        file: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A lockfile exists but does not match the manifest under `--frozen`.
    #[error("Lockfile is stale: {reason}")]
    FrozenLockfileMismatch { reason: String },

    /// Generic error for cases not covered by a specific variant.
    #[error("{message}")]
    Other { message: String },
}

impl From<std::io::Error> for ApmError {
    fn from(source: std::io::Error) -> Self {
        Self::IoError {
            operation: "unknown".to_string(),
            path: String::new(),
            source,
        }
    }
}

/// Wraps an [`ApmError`] with optional user-facing remediation text.
///
/// Mirrors the error/details/suggestion triad used for CLI display: the bare
/// error on one line, context on another, and a single actionable next step.
#[derive(Debug)]
pub struct ErrorContext {
    pub error: ApmError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub fn new(error: ApmError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with color, never emitting a stack trace
    /// unless `APM_DEBUG` is set by the caller.
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

/// Attach remediation text to a bare [`ApmError`], following the taxonomy in
/// the error handling design (§7): each variant gets a tailored hint.
pub fn contextualize(error: ApmError) -> ErrorContext {
    let ctx = ErrorContext::new(error);
    match &ctx.error {
        ApmError::UnsupportedHost { .. } => ctx.with_suggestion(
            "Supported hosts are github.com, *.ghe.com, dev.azure.com, and *.visualstudio.com; set GITHUB_HOST to allow another hostname",
        ),
        ApmError::InvalidVirtualExtension { .. } => ctx.with_suggestion(
            "Permitted typed extensions are .prompt.md, .instructions.md, .chatmode.md, .agent.md",
        ),
        ApmError::AuthRequired { .. } => ctx.with_suggestion(
            "Set GITHUB_APM_PAT, GITHUB_TOKEN, or ADO_APM_PAT depending on the host family",
        ),
        ApmError::ManifestMissingField { .. } => {
            ctx.with_suggestion("Add the missing field to the package's apm.yml")
        }
        ApmError::FrozenLockfileMismatch { .. } => {
            ctx.with_suggestion("Run `apm install` without --frozen to regenerate apm.lock")
        }
        _ => ctx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_message() {
        let err = ApmError::UnsupportedHost {
            host: "gitlab.example.com".into(),
        };
        assert_eq!(err.to_string(), "Unsupported host 'gitlab.example.com'");
    }

    #[test]
    fn contextualize_adds_suggestion() {
        let ctx = contextualize(ApmError::UnsupportedHost {
            host: "gitlab.example.com".into(),
        });
        assert!(ctx.suggestion.is_some());
        assert!(ctx.suggestion.unwrap().contains("GITHUB_HOST"));
    }
}
