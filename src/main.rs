use log::{error, info, warn};
use opencloud_auth::error::BoxError;
use opencloud_auth::http::ReqwestTransport;
use opencloud_auth::oauth::{AccessToken, Account, OAuthApp, DEFAULT_VERIFIER_LENGTH};
use opencloud_auth::webhook::{EventKind, Notification, NotificationEvent, Webhook};
use secrecy::{ExposeSecret, SecretString};
use service::config::{Command, Config};
use service::logging::Logger;
use std::path::Path;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(&config).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(config: &Config) -> Result<(), BoxError> {
    match &config.command {
        Command::VerifyWebhook {
            body_file,
            signature,
        } => verify_webhook(config, body_file, signature.as_deref()),
        command => {
            let app = build_app(config)?;
            run_oauth(&app, command).await
        }
    }
}

fn build_app(config: &Config) -> Result<OAuthApp, BoxError> {
    let client_id = config.client_id.ok_or("CLIENT_ID is required")?;
    let client_secret = config
        .client_secret()
        .map(|s| SecretString::new(s.expose_secret().clone()))
        .ok_or("CLIENT_SECRET is required")?;
    let redirect_uri = config
        .redirect_uri
        .as_deref()
        .ok_or("REDIRECT_URI is required")?;

    let transport = ReqwestTransport::builder()
        .with_base_url(&config.api_base_url)
        .with_timeout(config.http_timeout())
        .build()?;

    info!(
        "Using OAuth client {} against {}",
        client_id, config.api_base_url
    );

    Ok(
        OAuthApp::with_transport(client_id, client_secret, redirect_uri, transport)
            .with_key_cache_ttl(config.openid_certs_cache_seconds)
            .with_authorization_endpoint(&config.authorization_endpoint()),
    )
}

async fn run_oauth(app: &OAuthApp, command: &Command) -> Result<(), BoxError> {
    match command {
        Command::AuthorizeUrl {
            scopes,
            state,
            no_code,
            pkce,
        } => {
            let verifier = pkce.then(|| app.generate_code_verifier(DEFAULT_VERIFIER_LENGTH));
            let uri = app.generate_authorization_uri(
                scopes,
                state.as_deref(),
                !no_code,
                verifier.as_deref(),
            );
            println!("{uri}");
            if let Some(verifier) = verifier {
                println!("code_verifier: {verifier}");
            }
        }
        Command::Exchange {
            code,
            code_verifier,
        } => {
            let token = app.exchange_code(code, code_verifier.as_deref()).await?;
            print_access_token(&token);
        }
        Command::Refresh { refresh_token } => {
            let token = app.refresh_token(refresh_token).await?;
            print_access_token(&token);
        }
        Command::Revoke { token } => {
            app.revoke_token(token).await?;
            println!("revoked");
        }
        Command::TokenInfo { token } => {
            let info = app.fetch_token_info(token).await?;
            println!("active: {}", info.active);
            if let Some(id) = &info.id {
                println!("id: {id}");
            }
            if let Some(user_id) = info.user_id {
                println!("user_id: {user_id}");
            }
            if let Some(client_id) = info.client_id {
                println!("client_id: {client_id}");
            }
            println!("scope: {}", join(&info.scope));
            if let Some(expires_at) = info.expires_at {
                println!("expires_at: {}", expires_at.to_rfc3339());
            }
        }
        Command::Resources { token } => {
            let resources = app.fetch_resources(token).await?;
            for experience in &resources.experiences {
                match experience.owner {
                    Some(owner) => println!("experience {} ({})", experience.id, account(owner)),
                    None => println!("experience {}", experience.id),
                }
            }
            for granted in &resources.accounts {
                println!("{}", account(*granted));
            }
        }
        Command::Userinfo { token } => {
            let user = app.fetch_userinfo(token).await?;
            println!("id: {}", user.id);
            if let Some(username) = &user.username {
                println!("username: {username}");
            }
            if let Some(display_name) = &user.display_name {
                println!("display_name: {display_name}");
            }
            if let Some(created_at) = user.created_at {
                println!("created_at: {}", created_at.to_rfc3339());
            }
        }
        Command::VerifyWebhook { .. } => {}
    }
    Ok(())
}

fn verify_webhook(
    config: &Config,
    body_file: &Path,
    signature: Option<&str>,
) -> Result<(), BoxError> {
    let body = std::fs::read(body_file)?;

    let mut webhook = Webhook::new();
    match config
        .webhook_secret()
        .filter(|secret| !secret.expose_secret().is_empty())
    {
        Some(secret) => webhook = webhook.with_secret(secret.expose_secret().as_bytes()),
        None => warn!("WEBHOOK_SECRET is not set, signatures will not be checked"),
    }
    let webhook = EventKind::ALL
        .into_iter()
        .fold(webhook, |webhook, kind| webhook.on(kind, print_notification))
        .on_error(|notification, e| {
            error!(
                "Notification {} was not handled: {e}",
                notification.notification_id
            )
        });

    let response = webhook.process_notification(&body, signature)?;
    println!("{} {}", response.status, response.body);
    Ok(())
}

fn print_notification(notification: &Notification) -> Result<(), BoxError> {
    println!(
        "notification {} at {}",
        notification.notification_id,
        notification.timestamp.to_rfc3339()
    );
    match &notification.event {
        NotificationEvent::Test { user_id } => println!("test notification from user {user_id}"),
        NotificationEvent::RightToErasureRequest {
            user_id,
            experience_ids,
        } => println!(
            "erasure request for user {user_id} in experiences {experience_ids:?}"
        ),
        NotificationEvent::Generic => {}
    }
    Ok(())
}

fn print_access_token(token: &AccessToken) {
    println!("access_token: {}", token.token().expose_secret());
    if let Some(refresh_token) = token.refresh_token() {
        println!("refresh_token: {}", refresh_token.expose_secret());
    }
    println!("expires_at: {}", token.expires_at().to_rfc3339());
    println!("scope: {}", join(token.scope()));
    if let Some(user) = token.user() {
        println!(
            "user: {} ({})",
            user.id,
            user.username.as_deref().unwrap_or("unknown")
        );
    }
}

fn account(account: Account) -> String {
    match account {
        Account::User(id) => format!("user {id}"),
        Account::Group(id) => format!("group {id}"),
    }
}

fn join<'a>(values: impl IntoIterator<Item = &'a String>) -> String {
    values
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}
