use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};
use std::io::Write;
use std::path::PathBuf;

/// Filings Auth - session client for the filings research API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Base URL of the API (e.g. http://localhost:8000)
    #[arg(short = 'u', long, env = "API_URL")]
    pub api_url: Option<String>,

    /// Access token lifetime configured on the server, in minutes
    #[arg(long, env = "ACCESS_TOKEN_EXPIRE_MINUTES", default_value = "30")]
    pub token_expire_minutes: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "60")]
    pub http_timeout: u64,

    /// File keeping the session cookies between runs
    #[arg(long, env = "COOKIE_FILE", default_value = ".filings-session.json")]
    pub cookie_file: PathBuf,

    /// Keep cookies in memory only; every run starts signed out
    #[arg(long)]
    pub no_cookie_file: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do once the session is resolved
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Resume an existing session from the refresh cookie and print it
    Session {
        #[command(flatten)]
        follow_up: FollowUp,
    },

    /// Log in with email and password
    Login {
        #[arg(short, long)]
        email: String,

        /// Prompted for when omitted
        #[arg(short, long, env = "FILINGS_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Bot-verification token from the Turnstile widget
        #[arg(short, long, env = "TURNSTILE_TOKEN", hide_env_values = true)]
        turnstile_token: String,

        #[command(flatten)]
        follow_up: FollowUp,
    },

    /// Log in with a Google access token
    Google {
        #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
        token: String,

        #[command(flatten)]
        follow_up: FollowUp,
    },

    /// Email a sign-in link
    MagicLink {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "TURNSTILE_TOKEN", hide_env_values = true)]
        turnstile_token: String,
    },

    /// Sign in with the token from a magic link
    VerifyMagicLink {
        /// Value of the link's `token` query parameter
        token: Option<String>,

        #[command(flatten)]
        follow_up: FollowUp,
    },

    /// Confirm the email address with the token from the verification email
    VerifyEmail {
        /// Value of the link's `token` query parameter
        token: Option<String>,

        #[command(flatten)]
        follow_up: FollowUp,
    },

    /// Email a password-reset link
    ForgotPassword {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "TURNSTILE_TOKEN", hide_env_values = true)]
        turnstile_token: String,
    },

    /// Set a new password with the token from the reset email
    ResetPassword {
        /// Value of the link's `token` query parameter
        token: Option<String>,

        /// Prompted for (with confirmation) when omitted
        #[arg(short, long, env = "FILINGS_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        #[arg(short, long, env = "TURNSTILE_TOKEN", hide_env_values = true)]
        turnstile_token: String,
    },

    /// Create an account
    Register {
        #[arg(short, long)]
        email: String,

        /// Prompted for (with confirmation) when omitted
        #[arg(short, long, env = "FILINGS_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,

        #[arg(short, long, env = "TURNSTILE_TOKEN", hide_env_values = true)]
        turnstile_token: String,
    },

    /// Resume the session and request API paths with it
    Fetch {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Resume the session and update the profile
    Profile {
        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,
    },
}

/// Work done after a successful sign-in
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowUp {
    /// API path to request with the new session (repeatable)
    #[arg(long = "fetch", value_name = "PATH")]
    pub fetch: Vec<String>,

    /// Keep the session alive with proactive refreshes until Ctrl+C
    #[arg(long)]
    pub keep_alive: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    // API
    pub api_url: String,

    // Session
    pub access_token_expire_minutes: u64,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Session cookies (None keeps them in memory)
    pub cookie_file: Option<PathBuf>,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut args = CliArgs::parse();

        if args.api_url.is_none() && needs_interactive_setup() {
            let interactive_config = run_interactive_setup()?;
            args.api_url = Some(interactive_config.api_url);
            args.token_expire_minutes = interactive_config.access_token_expire_minutes;
        }

        Self::from_args(args)
    }

    /// Build the config from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<(Self, Command)> {
        let api_url = args
            .api_url
            .as_deref()
            .map(normalize_api_url)
            .context("API_URL is required (use --api-url or set API_URL env var)")?;

        let config = Config {
            api_url,

            access_token_expire_minutes: args.token_expire_minutes,

            // HTTP client
            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),

            http_request_timeout: args.http_timeout,

            cookie_file: (!args.no_cookie_file).then_some(args.cookie_file),

            // Logging
            log_level: args.log_level,
            log_format: parse_log_format(&args.log_format),
        };

        Ok((config, args.command))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.api_url)
            .with_context(|| format!("API_URL is not a valid URL: {}", self.api_url))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("API_URL must use http or https: {}", self.api_url);
        }

        if self.access_token_expire_minutes == 0 {
            anyhow::bail!("ACCESS_TOKEN_EXPIRE_MINUTES must be positive");
        }

        if self.http_request_timeout == 0 {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be positive");
        }

        Ok(())
    }
}

/// Trim whitespace and trailing slashes
fn normalize_api_url(s: &str) -> String {
    s.trim().trim_end_matches('/').to_string()
}

/// Parse log format from string
fn parse_log_format(s: &str) -> LogFormat {
    match s.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}

/// Prompt for a password on the terminal
pub fn prompt_password(confirm: bool) -> Result<String> {
    let mut prompt = Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
    }

    prompt.interact().context("Failed to read password")
}

// === Interactive Setup ===

/// Check if interactive setup is needed (no .env file and no API_URL)
pub fn needs_interactive_setup() -> bool {
    let env_file_exists = std::path::Path::new(".env").exists();
    let has_api_url = std::env::var("API_URL").is_ok();

    !env_file_exists && !has_api_url
}

/// Run interactive setup to collect required configuration
pub fn run_interactive_setup() -> Result<InteractiveConfig> {
    println!();
    println!("No configuration found. Let's point the client at your API.");
    println!();

    let api_url: String = Input::new()
        .with_prompt("API base URL (API_URL)")
        .default("http://localhost:8000".to_string())
        .interact_text()
        .context("Failed to read API_URL")?;

    let expire_minutes: String = Input::new()
        .with_prompt("Access token lifetime in minutes (ACCESS_TOKEN_EXPIRE_MINUTES)")
        .default("30".to_string())
        .interact_text()
        .context("Failed to read ACCESS_TOKEN_EXPIRE_MINUTES")?;

    let access_token_expire_minutes = expire_minutes
        .trim()
        .parse()
        .with_context(|| format!("Not a number of minutes: {}", expire_minutes))?;

    let config = InteractiveConfig {
        api_url: normalize_api_url(&api_url),
        access_token_expire_minutes,
    };

    println!();
    let save_to_env = Confirm::new()
        .with_prompt("Save configuration to .env file?")
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save_to_env {
        save_env_file(&config)?;
        println!();
        println!("Configuration saved to .env file");
    }

    println!();
    Ok(config)
}

/// Configuration collected from interactive setup
#[derive(Debug, Clone)]
pub struct InteractiveConfig {
    pub api_url: String,
    pub access_token_expire_minutes: u64,
}

/// Save configuration to .env file
fn save_env_file(config: &InteractiveConfig) -> Result<()> {
    let env_content = format!(
        r#"# Filings Auth Configuration
# Generated by interactive setup

# Base URL of the API (required)
API_URL={}

# Access token lifetime configured on the server
ACCESS_TOKEN_EXPIRE_MINUTES={}

# Session cookies are kept here between runs
# COOKIE_FILE=.filings-session.json

# Logging (trace, debug, info, warn, error)
LOG_LEVEL=info

# Log format (text, json)
LOG_FORMAT=text
"#,
        config.api_url, config.access_token_expire_minutes,
    );

    let mut file = std::fs::File::create(".env").context("Failed to create .env file")?;
    file.write_all(env_content.as_bytes())
        .context("Failed to write .env file")?;

    Ok(())
}
