use clap::builder::TypedValueParser as _;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::LevelFilter;
use secrecy::SecretString;
use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Duration;

/// Default Open Cloud API base URL used when `API_BASE_URL` is not set.
pub const DEFAULT_API_BASE_URL: &str = "https://apis.roblox.com";

const AUTHORIZE_PATH: &str = "oauth/v1/authorize";

fn secret(value: &str) -> Result<SecretString, Infallible> {
    Ok(SecretString::new(value.to_string()))
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The OAuth application's client id.
    #[arg(long, env)]
    pub client_id: Option<u64>,

    /// The OAuth application's client secret.
    #[arg(long, env, hide_env_values = true, value_parser = secret)]
    client_secret: Option<SecretString>,

    /// The redirect URI registered for the OAuth application.
    #[arg(long, env)]
    pub redirect_uri: Option<String>,

    /// Seconds to reuse fetched OpenID certs before fetching them again
    #[arg(long, env, default_value_t = 3600)]
    pub openid_certs_cache_seconds: u64,

    /// Shared secret webhook notifications are signed with.
    #[arg(long, env, hide_env_values = true, value_parser = secret)]
    webhook_secret: Option<SecretString>,

    /// The base URL of the Open Cloud API.
    /// Override in tests to point at a mock server.
    #[arg(long, env, default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// Timeout in seconds for each HTTP request
    #[arg(long, env, default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .try_map(|s| s.parse::<LevelFilter>()),
        )]
    pub log_level_filter: LevelFilter,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Print the URL to send a user to for consent
    AuthorizeUrl {
        /// Scopes to request
        #[arg(
            long = "scope",
            value_delimiter = ',',
            use_value_delimiter = true,
            default_value = "openid,profile"
        )]
        scopes: Vec<String>,
        /// Opaque value returned with the redirect
        #[arg(long)]
        state: Option<String>,
        /// Ask for consent without issuing an authorization code
        #[arg(long)]
        no_code: bool,
        /// Generate a PKCE code verifier and include its challenge
        #[arg(long)]
        pkce: bool,
    },
    /// Exchange an authorization code for tokens
    Exchange {
        #[arg(long)]
        code: String,
        #[arg(long)]
        code_verifier: Option<String>,
    },
    /// Exchange a refresh token for new tokens
    Refresh {
        #[arg(long)]
        refresh_token: String,
    },
    /// Revoke an access or refresh token
    Revoke {
        #[arg(long)]
        token: String,
    },
    /// Introspect an access token
    TokenInfo {
        #[arg(long)]
        token: String,
    },
    /// List the experiences and accounts an access token was granted
    Resources {
        #[arg(long)]
        token: String,
    },
    /// Show the user an access token belongs to
    Userinfo {
        #[arg(long)]
        token: String,
    },
    /// Verify and dispatch a saved webhook request
    VerifyWebhook {
        /// File holding the raw request body
        #[arg(long)]
        body_file: PathBuf,
        /// Value of the roblox-signature header
        #[arg(long)]
        signature: Option<String>,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn client_secret(&self) -> Option<&SecretString> {
        self.client_secret.as_ref()
    }

    pub fn webhook_secret(&self) -> Option<&SecretString> {
        self.webhook_secret.as_ref()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// The authorization endpoint under the configured base URL.
    pub fn authorization_endpoint(&self) -> String {
        format!("{}/{}", self.api_base_url.trim_end_matches('/'), AUTHORIZE_PATH)
    }
}
