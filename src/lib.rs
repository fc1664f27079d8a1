use clap::Parser;

pub mod cli;
pub mod client;
pub mod config;
pub mod credentials;
pub mod gate;
pub mod logger;
pub mod output;

use client::ClientError;

/// Entry point used by the binary crate.
pub fn run() -> Result<(), Error> {
    let cli = cli::Cli::parse();
    logger::init(cli.verbose);
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(cli::execute(cli))
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Gate(#[from] gate::GateError),
    #[error(transparent)]
    Render(#[from] output::RenderError),
    #[error(transparent)]
    Runtime(#[from] std::io::Error),
    #[error("{0}")]
    MissingField(String),
    #[error("aborted")]
    Aborted,
}

impl Error {
    /// Reserved process exit status, stable for agent consumption:
    /// 0 success, 1 general, 2 auth, 3 not-found, 4 validation,
    /// 5 upstream, 6 mutation-blocked.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Gate(_) => 6,
            Error::Client(err) => match err {
                ClientError::Unauthorized(_)
                | ClientError::AuthFailed(_)
                | ClientError::MfaRequired
                | ClientError::MfaFailed(_)
                | ClientError::InvalidToken => 2,
                ClientError::NotFound(_) => 3,
                ClientError::Validation(_)
                | ClientError::InvalidDate(_)
                | ClientError::InvalidBaseUrl(_)
                | ClientError::InvalidEndpoint(_) => 4,
                ClientError::RateLimited(_)
                | ClientError::Timeout(_)
                | ClientError::Api { .. }
                | ClientError::Graphql(_)
                | ClientError::Http(_)
                | ClientError::HttpClient(_) => 5,
                ClientError::MissingSession
                | ClientError::Io { .. }
                | ClientError::SessionParse(_) => 1,
            },
            Error::MissingField(_) => 4,
            Error::Config(_) | Error::Render(_) | Error::Runtime(_) | Error::Aborted => 1,
        }
    }

    /// Stable machine-readable code for the stderr envelope.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Gate(_) => "MUTATION_BLOCKED",
            Error::Client(err) => match err {
                ClientError::Unauthorized(_) => "AUTH_REQUIRED",
                ClientError::AuthFailed(_) => "AUTH_FAILED",
                ClientError::MfaRequired => "AUTH_MFA_REQUIRED",
                ClientError::MfaFailed(_) => "AUTH_MFA_FAILED",
                ClientError::InvalidToken => "AUTH_INVALID_TOKEN",
                ClientError::NotFound(_) => "NOT_FOUND",
                ClientError::InvalidDate(_) => "VALIDATION_INVALID_DATE",
                ClientError::Validation(_)
                | ClientError::InvalidBaseUrl(_)
                | ClientError::InvalidEndpoint(_) => "VALIDATION_INVALID_VALUE",
                ClientError::RateLimited(_) => "API_RATE_LIMIT",
                ClientError::Timeout(_) => "API_TIMEOUT",
                ClientError::Http(source) if source.is_timeout() => "API_TIMEOUT",
                ClientError::Api { .. }
                | ClientError::Graphql(_)
                | ClientError::Http(_)
                | ClientError::HttpClient(_) => "API_ERROR",
                ClientError::MissingSession
                | ClientError::Io { .. }
                | ClientError::SessionParse(_) => "UNKNOWN_ERROR",
            },
            Error::MissingField(_) => "VALIDATION_MISSING_FIELD",
            Error::Config(_) | Error::Render(_) | Error::Runtime(_) | Error::Aborted => {
                "UNKNOWN_ERROR"
            }
        }
    }

    fn message_and_details(&self) -> (String, Option<String>) {
        match self {
            Error::Gate(err) => (err.to_string(), Some(gate::REMEDIATION.to_string())),
            Error::Client(ClientError::Unauthorized(_)) => (
                "Authentication required".to_string(),
                Some("Run 'mmoney auth login' first.".to_string()),
            ),
            Error::Client(ClientError::AuthFailed(detail)) => {
                ("Login failed".to_string(), Some(detail.clone()))
            }
            Error::Client(ClientError::MfaRequired) => (
                "Multi-factor authentication required".to_string(),
                Some("Retry with --mfa-code or --mfa-secret.".to_string()),
            ),
            Error::Client(ClientError::MfaFailed(detail)) => {
                ("MFA login failed".to_string(), Some(detail.clone()))
            }
            other => (other.to_string(), None),
        }
    }

    /// Structured error envelope emitted on stderr. The `details` key is
    /// omitted entirely when there is nothing to add.
    pub fn envelope(&self) -> serde_json::Value {
        let (message, details) = self.message_and_details();
        let mut error = serde_json::Map::new();
        error.insert(
            "code".to_string(),
            serde_json::Value::String(self.error_code().to_string()),
        );
        error.insert("message".to_string(), serde_json::Value::String(message));
        if let Some(details) = details {
            error.insert("details".to_string(), serde_json::Value::String(details));
        }
        serde_json::json!({ "error": error })
    }
}
