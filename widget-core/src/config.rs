use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WidgetConfig {
    /// OAuth client registered with the telephony platform
    pub client_id: String,
    /// Base of the authorization and token endpoints (e.g. https://login.example.com)
    pub login_base_url: String,
    /// Base of the REST surface (e.g. https://api.example.com/api/v2)
    pub api_base_url: String,
    /// Where the authorization popup lands after login
    pub redirect_uri: String,
    /// Origin popup callback messages must carry to be accepted
    pub host_origin: String,
    /// Voicemails per page
    pub page_size: u32,
    /// Wait after a code exchange before the first fetch and channel setup.
    pub settle_delay: Duration,
    /// Quiet period after a push event before the list is re-fetched.
    pub refresh_debounce: Duration,
    /// Wait between a socket close and the next connection attempt.
    pub reconnect_backoff: Duration,
    /// Per-request timeout for REST calls
    pub http_timeout: Duration,
    /// Durable Token Store location
    pub session_file: PathBuf,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            login_base_url: "https://login.mypurecloud.com".to_string(),
            api_base_url: "https://api.mypurecloud.com/api/v2".to_string(),
            redirect_uri: "http://127.0.0.1:8787/oauth/callback".to_string(),
            host_origin: "http://127.0.0.1:8787".to_string(),
            page_size: 10,
            settle_delay: Duration::from_millis(3000),
            refresh_debounce: Duration::from_millis(1000),
            reconnect_backoff: Duration::from_millis(5000),
            http_timeout: Duration::from_secs(30),
            session_file: PathBuf::from("./data/session.json"),
        }
    }
}

impl WidgetConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let page_size: u32 = env_parse("VOICEMAIL_PAGE_SIZE", defaults.page_size)?;
        if page_size == 0 {
            return Err(anyhow::anyhow!("VOICEMAIL_PAGE_SIZE must be at least 1"));
        }

        Ok(Self {
            client_id: env_str("VOICEMAIL_CLIENT_ID", &defaults.client_id),
            login_base_url: env_str("VOICEMAIL_LOGIN_BASE_URL", &defaults.login_base_url),
            api_base_url: env_str("VOICEMAIL_API_BASE_URL", &defaults.api_base_url),
            redirect_uri: env_str("VOICEMAIL_REDIRECT_URI", &defaults.redirect_uri),
            host_origin: env_str("VOICEMAIL_HOST_ORIGIN", &defaults.host_origin),
            page_size,
            settle_delay: Duration::from_millis(env_parse("VOICEMAIL_SETTLE_DELAY_MS", 3000)?),
            refresh_debounce: Duration::from_millis(env_parse(
                "VOICEMAIL_REFRESH_DEBOUNCE_MS",
                1000,
            )?),
            reconnect_backoff: Duration::from_millis(env_parse(
                "VOICEMAIL_RECONNECT_BACKOFF_MS",
                5000,
            )?),
            http_timeout: Duration::from_secs(env_parse("VOICEMAIL_HTTP_TIMEOUT_SECS", 30)?),
            session_file: PathBuf::from(env_str(
                "VOICEMAIL_SESSION_FILE",
                &defaults.session_file.to_string_lossy(),
            )),
        })
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/oauth/authorize", self.login_base_url.trim_end_matches('/'))
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.login_base_url.trim_end_matches('/'))
    }
}

pub fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}
