use thiserror::Error;

/// Failure of a single authenticated REST call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl GatewayError {
    /// Authorization expired or was revoked.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Status { status: 401, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("the login popup was blocked; allow popups for this page and try again")]
    PopupBlocked,

    #[error("no pending login was found for this callback; start the login again")]
    MissingVerifier,

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),
}

/// Real-time channel setup failure. Logged, never surfaced to the user.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("{step} failed: {source}")]
    Setup {
        step: &'static str,
        #[source]
        source: GatewayError,
    },

    #[error("socket connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("platform response is missing the {0}")]
    MissingField(&'static str),
}
