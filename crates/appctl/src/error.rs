//! User-facing failures of appctl commands
//!
//! Every [`CoreError`] is mapped onto an [`AppCtlError`], which knows how to
//! render itself as a diagnostic with tips. A crashed rollout and a startup
//! timeout get different messages and different advice.

use appctl_core::{CoreError, RolloutConfigError};
use colored::Colorize;
use thiserror::Error;

/// Cargo-style diagnostic formatter for CLI errors.
///
/// Produces structured output like:
/// ```text
/// error: All instances of app 'billing' crashed
///   Every instance of one of its processes is in the CRASHED state.
///
///   tip: Check the recent logs of 'billing' for the crash reason
/// ```
pub struct CliDiagnostic {
    message: String,
    detail: Option<String>,
    tips: Vec<(String, Vec<String>)>,
}

impl CliDiagnostic {
    /// Start a new error diagnostic with the given message.
    pub fn error(message: &str) -> Self {
        Self {
            message: message.to_string(),
            detail: None,
            tips: Vec::new(),
        }
    }

    /// Add a detail line below the error message.
    pub fn detail(mut self, text: &str) -> Self {
        self.detail = Some(text.to_string());
        self
    }

    /// Add a tip with optional example commands.
    pub fn tip(mut self, description: &str, commands: &[&str]) -> Self {
        self.tips.push((
            description.to_string(),
            commands.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Render without colors, one line per entry.
    #[cfg(test)]
    pub fn render_plain(&self) -> String {
        let mut out = format!("error: {}\n", self.message);
        if let Some(detail) = &self.detail {
            out.push_str(&format!("  {}\n", detail));
        }
        for (description, commands) in &self.tips {
            out.push_str(&format!("\n  tip: {}\n", description));
            for cmd in commands {
                out.push_str(&format!("      {}\n", cmd));
            }
        }
        out
    }

    /// Print the diagnostic to stderr with colored formatting.
    pub fn print(&self) {
        eprint!("{}{}", "error".red().bold(), ": ".bold());
        eprintln!("{}", self.message);

        if let Some(detail) = &self.detail {
            eprintln!("  {}", detail);
        }

        for (description, commands) in &self.tips {
            eprintln!();
            eprint!("  {}{}", "tip".yellow().bold(), ": ".bold());
            eprintln!("{}", description);
            for cmd in commands {
                eprintln!("      {}", cmd);
            }
        }
    }
}

/// Main error type for the appctl application
#[derive(Error, Debug)]
pub enum AppCtlError {
    #[error("No API endpoint set. Use --api-url or APPCTL_API_URL.")]
    MissingEndpoint,

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A remote job failed; the platform's message is shown as is
    #[error("{message}")]
    JobFailed { message: String },

    #[error("{message}")]
    Timeout { message: String },

    #[error("All instances of app '{app}' crashed")]
    AppCrashed { app: String },

    #[error("Start app timeout: app '{app}' did not become healthy within {minutes} minute(s)")]
    StartupTimeout { app: String, minutes: u64 },

    #[error("Staging app '{app}' timed out after {minutes} minute(s)")]
    StagingTimeout { app: String, minutes: u64 },

    #[error("Staging failed for app '{app}': {reason}")]
    StagingFailed { app: String, reason: String },

    #[error("API error: {message}")]
    ApiError { status: Option<u16>, message: String },

    #[error("Connection error: {message}")]
    ConnectionError { message: String },
}

/// Result type for appctl operations
pub type Result<T> = std::result::Result<T, AppCtlError>;

impl AppCtlError {
    /// Get helpful suggestions for resolving this error
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            AppCtlError::MissingEndpoint => vec![
                "Point appctl at your platform: export APPCTL_API_URL=https://api.example.com"
                    .to_string(),
            ],
            AppCtlError::InvalidInput { .. } => vec![
                "Check the command syntax: appctl restart --help".to_string(),
            ],
            AppCtlError::AppCrashed { app } => vec![
                format!("Check the recent logs of '{}' for the crash reason", app),
                "Make sure the start command and health check match the application".to_string(),
            ],
            AppCtlError::StartupTimeout { .. } => vec![
                "Instances are still starting; the platform keeps trying after appctl exits"
                    .to_string(),
                "Allow more time with APPCTL_STARTUP_TIMEOUT=<minutes>".to_string(),
            ],
            AppCtlError::StagingTimeout { .. } => vec![
                "Allow more time with APPCTL_STAGING_TIMEOUT=<minutes>".to_string(),
            ],
            AppCtlError::Timeout { .. } => vec![
                "Raise the limit with APPCTL_ASYNC_TIMEOUT=<minutes>, or 0 for no limit".to_string(),
            ],
            AppCtlError::ApiError {
                status: Some(404), ..
            } => vec![
                "Verify the GUID is correct".to_string(),
            ],
            AppCtlError::ApiError {
                status: Some(401), ..
            } => vec![
                "Refresh your token and export it as APPCTL_TOKEN".to_string(),
            ],
            AppCtlError::ConnectionError { .. } => vec![
                "Check network connectivity".to_string(),
                "Verify the API endpoint is correct: --api-url or APPCTL_API_URL".to_string(),
            ],
            _ => vec![],
        }
    }

    /// Extra context shown under the error line
    pub fn detail(&self) -> Option<&'static str> {
        match self {
            AppCtlError::AppCrashed { .. } => {
                Some("Every instance of one of its processes is in the CRASHED state.")
            }
            AppCtlError::StartupTimeout { .. } => {
                Some("No process crashed, but not every instance reached RUNNING in time.")
            }
            _ => None,
        }
    }

    /// Build a cargo-style diagnostic for this error.
    pub fn diagnostic(&self) -> CliDiagnostic {
        let mut diag = CliDiagnostic::error(&format!("{}", self));

        if let Some(detail) = self.detail() {
            diag = diag.detail(detail);
        }

        for suggestion in self.suggestions() {
            diag = diag.tip(&suggestion, &[]);
        }

        diag
    }

    /// Print a cargo-style diagnostic to stderr using colored formatting.
    pub fn print_diagnostic(&self) {
        self.diagnostic().print();
    }
}

impl From<RolloutConfigError> for AppCtlError {
    fn from(err: RolloutConfigError) -> Self {
        AppCtlError::InvalidInput {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for AppCtlError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Job(job_err) => AppCtlError::JobFailed {
                message: job_err.detail,
            },
            CoreError::JobTimeout { .. } => AppCtlError::Timeout {
                message: err.to_string(),
            },
            CoreError::RolloutConfig(config_err) => AppCtlError::from(config_err),
            CoreError::AllInstancesCrashed { app } => AppCtlError::AppCrashed { app },
            CoreError::StartupTimeout { app, timeout } => AppCtlError::StartupTimeout {
                app,
                minutes: timeout.as_secs().div_ceil(60),
            },
            CoreError::StagingTimeout { app, timeout } => AppCtlError::StagingTimeout {
                app,
                minutes: timeout.as_secs().div_ceil(60),
            },
            CoreError::StagingFailed { app, reason } => AppCtlError::StagingFailed { app, reason },
            CoreError::Api { status, message } => AppCtlError::ApiError {
                status: Some(status),
                message: format!("HTTP {}: {}", status, message),
            },
            CoreError::UnexpectedResponse(message) => AppCtlError::ApiError {
                status: None,
                message,
            },
            CoreError::Transport(message) => AppCtlError::ConnectionError { message },
        }
    }
}
