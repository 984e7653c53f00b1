use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ErrorContext
// ---------------------------------------------------------------------------

/// Identifiers attached to an error once it crosses an orchestrator entry
/// point, so callers can correlate a failure with the execution it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub project_id: Option<String>,
    pub execution_id: Option<String>,
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.project_id, &self.execution_id) {
            (Some(p), Some(e)) => write!(f, " [project={p} execution={e}]"),
            (Some(p), None) => write!(f, " [project={p}]"),
            (None, Some(e)) => write!(f, " [execution={e}]"),
            (None, None) => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Discriminant of [`TaskError`], recorded on retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Container,
    Execution,
    Repository,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Container => "container",
            ErrorKind::Execution => "execution",
            ErrorKind::Repository => "repository",
        }
    }
}

// ---------------------------------------------------------------------------
// TaskError
// ---------------------------------------------------------------------------

/// Error taxonomy shared by the orchestrator and the repository cache.
///
/// - `Validation` is raised before any side effect takes place.
/// - `Container` covers provisioning and reuse failures.
/// - `Execution` is a managed command that failed; it carries the exit code
///   when the command ran to completion.
/// - `Repository` covers URL, cache-directory and git failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    #[error("validation failed: {message}{context}")]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("container error: {message}{context}")]
    Container {
        message: String,
        context: ErrorContext,
    },

    #[error("execution failed (exit code {}): {message}{context}", display_exit(.exit_code))]
    Execution {
        message: String,
        exit_code: Option<i32>,
        context: ErrorContext,
    },

    #[error("repository error: {message}{context}")]
    Repository {
        message: String,
        context: ErrorContext,
    },
}

fn display_exit(code: &Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "none".into())
}

pub type Result<T> = std::result::Result<T, TaskError>;

impl TaskError {
    pub fn validation(message: impl Into<String>) -> Self {
        TaskError::Validation {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn container(message: impl Into<String>) -> Self {
        TaskError::Container {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn execution(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        TaskError::Execution {
            message: message.into(),
            exit_code,
            context: ErrorContext::default(),
        }
    }

    pub fn repository(message: impl Into<String>) -> Self {
        TaskError::Repository {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::Validation { .. } => ErrorKind::Validation,
            TaskError::Container { .. } => ErrorKind::Container,
            TaskError::Execution { .. } => ErrorKind::Execution,
            TaskError::Repository { .. } => ErrorKind::Repository,
        }
    }

    /// The bare message, without the kind prefix or context suffix.
    pub fn message(&self) -> &str {
        match self {
            TaskError::Validation { message, .. }
            | TaskError::Container { message, .. }
            | TaskError::Execution { message, .. }
            | TaskError::Repository { message, .. } => message,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TaskError::Execution { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            TaskError::Validation { context, .. }
            | TaskError::Container { context, .. }
            | TaskError::Execution { context, .. }
            | TaskError::Repository { context, .. } => context,
        }
    }

    /// Attach project/execution identifiers. Identifiers already present are
    /// kept, so the innermost context wins.
    pub fn with_context(mut self, project_id: &str, execution_id: &str) -> Self {
        let ctx = match &mut self {
            TaskError::Validation { context, .. }
            | TaskError::Container { context, .. }
            | TaskError::Execution { context, .. }
            | TaskError::Repository { context, .. } => context,
        };
        if ctx.project_id.is_none() {
            ctx.project_id = Some(project_id.to_string());
        }
        if ctx.execution_id.is_none() {
            ctx.execution_id = Some(execution_id.to_string());
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
