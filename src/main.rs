use anyhow::{Context, Result};

use filings_auth::auth::{
    BotVerification, EmailVerificationOutcome, EmailVerifier, MagicLinkOutcome,
    MagicLinkVerifier, Registration, SessionManager,
};
use filings_auth::config::{self, Command, Config, FollowUp, LogFormat};
use filings_auth::error::AuthError;
use filings_auth::models::ProfileUpdate;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let (config, command) = Config::load()?;
    config.validate()?;

    init_tracing(&config);

    tracing::info!("Filings Auth v{} starting...", env!("CARGO_PKG_VERSION"));
    tracing::debug!("API: {}", config.api_url);

    let manager = SessionManager::from_config(&config)?;

    // Resolve the initial loading state before anything else reads it
    if manager.initialize().await {
        tracing::info!("Resumed existing session");
    } else {
        tracing::debug!("No existing session");
    }

    let result = run(&manager, command).await;

    manager.shutdown();
    if let Err(e) = manager.save_cookies() {
        tracing::warn!("Session cookies not saved: {:#}", e);
    }
    result
}

fn init_tracing(config: &Config) {
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run(manager: &SessionManager, command: Command) -> Result<()> {
    match command {
        Command::Session { follow_up } => {
            if manager.user().is_none() {
                anyhow::bail!("No active session, log in first");
            }
            print_session(manager);
            follow_up_session(manager, follow_up).await
        }

        Command::Login {
            email,
            password,
            turnstile_token,
            follow_up,
        } => {
            let password = match password {
                Some(password) => password,
                None => config::prompt_password(false)?,
            };

            manager
                .login(
                    &email,
                    &password,
                    &mut BotVerification::with_token(turnstile_token),
                )
                .await
                .context("Login failed")?;
            print_session(manager);
            follow_up_session(manager, follow_up).await
        }

        Command::Google { token, follow_up } => {
            manager
                .login_with_google_via(token)
                .await
                .context("Google login failed")?;
            print_session(manager);
            follow_up_session(manager, follow_up).await
        }

        Command::MagicLink {
            email,
            turnstile_token,
        } => {
            manager
                .request_magic_link(&email, &mut BotVerification::with_token(turnstile_token))
                .await
                .context("Failed to send magic link")?;
            println!("Check your email for a sign-in link.");
            Ok(())
        }

        Command::VerifyMagicLink { token, follow_up } => {
            let verifier = MagicLinkVerifier::new();
            match verifier.verify(manager, token.as_deref()).await {
                MagicLinkOutcome::Verified { redirect_to } => {
                    print_session(manager);
                    tracing::debug!("Continue to {}", redirect_to);
                    follow_up_session(manager, follow_up).await
                }
                MagicLinkOutcome::Failed { message, retry_to } => {
                    anyhow::bail!("{} (request a new link via {})", message, retry_to)
                }
                MagicLinkOutcome::AlreadyAttempted => Ok(()),
            }
        }

        Command::VerifyEmail { token, follow_up } => {
            let verifier = EmailVerifier::new();
            match verifier.verify(manager, token.as_deref()).await {
                EmailVerificationOutcome::SignedIn { redirect_to } => {
                    println!("Email verified successfully!");
                    print_session(manager);
                    tracing::debug!("Continue to {}", redirect_to);
                    follow_up_session(manager, follow_up).await
                }
                EmailVerificationOutcome::Verified { message, .. } => {
                    println!("{}", message);
                    Ok(())
                }
                EmailVerificationOutcome::Failed { message, .. } => {
                    anyhow::bail!("{} (log in, or register again)", message)
                }
                EmailVerificationOutcome::AlreadyAttempted => Ok(()),
            }
        }

        Command::ForgotPassword {
            email,
            turnstile_token,
        } => {
            let message = manager
                .forgot_password(&email, &mut BotVerification::with_token(turnstile_token))
                .await
                .context("Failed to send reset email")?;
            println!("{}", message);
            Ok(())
        }

        Command::ResetPassword {
            token,
            password,
            turnstile_token,
        } => {
            // The prompt asks for the confirmation itself
            let password = match password {
                Some(password) => password,
                None => config::prompt_password(true)?,
            };

            let message = manager
                .reset_password(
                    token.as_deref(),
                    &password,
                    &password,
                    &mut BotVerification::with_token(turnstile_token),
                )
                .await
                .context("Failed to reset password")?;
            println!("{}", message);
            Ok(())
        }

        Command::Register {
            email,
            password,
            username,
            first_name,
            last_name,
            turnstile_token,
        } => {
            let password = match password {
                Some(password) => password,
                None => config::prompt_password(true)?,
            };

            let registration = Registration {
                email,
                password,
                username,
                first_name,
                last_name,
            };

            match manager
                .register(
                    registration,
                    &mut BotVerification::with_token(turnstile_token),
                )
                .await
            {
                Ok(message) => {
                    println!("{}", message);
                    Ok(())
                }
                Err(AuthError::Validation { fields }) => {
                    for (field, message) in &fields {
                        eprintln!("  {}: {}", field, message);
                    }
                    Err(AuthError::Validation { fields }).context("Registration failed")
                }
                Err(e) => Err(e).context("Registration failed"),
            }
        }

        Command::Fetch { paths } => {
            if manager.user().is_none() {
                anyhow::bail!("No active session, log in first");
            }
            fetch_paths(manager, &paths).await
        }

        Command::Profile {
            username,
            first_name,
            last_name,
        } => {
            let update = ProfileUpdate {
                username,
                first_name,
                last_name,
            };
            if update.is_empty() {
                anyhow::bail!("Nothing to update (use --username, --first-name or --last-name)");
            }

            manager
                .update_profile(update)
                .await
                .context("Failed to update profile")?;
            print_session(manager);
            Ok(())
        }
    }
}

/// Requests and keep-alive after a successful sign-in
async fn follow_up_session(manager: &SessionManager, follow_up: FollowUp) -> Result<()> {
    fetch_paths(manager, &follow_up.fetch).await?;

    if follow_up.keep_alive {
        tracing::info!("Keeping session alive, press Ctrl+C to log out");
        tokio::select! {
            _ = shutdown_signal() => {}
            _ = session_lost(manager) => {
                tracing::warn!("Session ended: {}", manager.error().unwrap_or_default());
            }
        }
        manager.logout().await;
        tracing::info!("Logged out");
    }

    Ok(())
}

async fn fetch_paths(manager: &SessionManager, paths: &[String]) -> Result<()> {
    for path in paths {
        let response = manager
            .client()
            .get(path)
            .await
            .with_context(|| format!("Request to {} failed", path))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        println!("{} {}", status.as_u16(), path);
        println!("{}", body);
    }
    Ok(())
}

/// Resolves once the credential is gone (failed renewal)
async fn session_lost(manager: &SessionManager) {
    let mut sessions = manager.subscribe();
    loop {
        if !sessions.borrow_and_update().is_authenticated() {
            return;
        }
        if sessions.changed().await.is_err() {
            return;
        }
    }
}

fn print_session(manager: &SessionManager) {
    let state = manager.state();
    match (state.user(), state.credential()) {
        (Some(user), Some(credential)) => {
            println!("Signed in as {} <{}>", user.display_name(), user.email);
            println!("  Tier:        {}", user.subscription_tier);
            println!("  Expires at:  {}", credential.expires_at().to_rfc3339());
        }
        _ => {
            println!("Not signed in");
            if let Some(error) = state.error() {
                println!("  {}", error);
            }
        }
    }
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, logging out...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, logging out...");
        },
    }
}
