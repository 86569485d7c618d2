use thiserror::Error;

/// Application level error type used throughout the crate.
#[derive(Error, Debug)]
pub enum RelayError {
    /// I/O related failure
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error while parsing YAML configuration files
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Error while encoding or decoding JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An external API answered but reported failure
    #[error("{service} API error: {message}")]
    Api {
        service: &'static str,
        message: String,
    },

    /// No usable session against the alarm source
    #[error("Session error: {0}")]
    Session(String),
}

impl RelayError {
    pub(crate) fn api(service: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            service,
            message: message.into(),
        }
    }
}

#[cfg(feature = "web")]
impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Convenient alias over [`Result`] using [`RelayError`]
pub type Result<T> = std::result::Result<T, RelayError>;
