//! refitt-auth - credential administration
//!
//! Every command prints one JSON object on stdout. Secret material appears
//! there exactly once; logs go to stderr and the log file.
//!
//! ```text
//! refitt-auth generate-new-root-key
//! refitt-auth --env prod generate-new-credentials --user-id 42
//! refitt-auth generate-new-session-token --user-id 42 --ttl 3600
//! ```

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::{Value, json};

use refitt_auth::auth::models::Level;
use refitt_auth::config::AppConfig;
use refitt_auth::credential::{CredentialService, PgCredentialStore};
use refitt_auth::db::Database;
use refitt_auth::logging::init_logging;
use refitt_auth::token::{Cipher, SessionTtl};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

#[derive(Parser, Debug)]
#[command(
    name = "refitt-auth",
    version = VERSION,
    about = "Issue, rotate and revoke API credentials"
)]
struct Cli {
    /// Configuration environment (reads config/<env>.yaml)
    #[arg(long, short = 'e', global = true, default_value = "dev")]
    env: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a new root key for `api.rootkey`
    GenerateNewRootKey,

    /// Issue a key and secret, or rotate both if the user already has them.
    /// `--level` applies to new clients only and is rejected on rotation.
    GenerateNewCredentials(CredentialsArgs),

    /// Replace the secret, keeping the key
    GenerateNewSecret(UserArgs),

    /// Issue or refresh the session token
    GenerateNewSessionToken(SessionArgs),

    /// Mark the user's credentials revoked
    RevokeCredentials(UserArgs),
}

#[derive(Args, Debug)]
struct UserArgs {
    #[arg(long)]
    user_id: i64,
}

#[derive(Args, Debug)]
struct CredentialsArgs {
    #[arg(long)]
    user_id: i64,

    /// Level for a new client (defaults to `api.default_client_level`);
    /// an existing client keeps its level
    #[arg(long)]
    level: Option<i32>,
}

#[derive(Args, Debug)]
struct SessionArgs {
    #[arg(long)]
    user_id: i64,

    /// Lifetime in seconds (defaults to `api.token_ttl_secs`)
    #[arg(long, conflicts_with = "forever", allow_negative_numbers = true)]
    ttl: Option<i64>,

    /// Token never expires
    #[arg(long, action = ArgAction::SetTrue)]
    forever: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // needs no configuration or store
    if let Command::GenerateNewRootKey = cli.command {
        return emit(new_rootkey());
    }

    let config = AppConfig::load(&cli.env)?;
    let _log_guard = init_logging(&config);
    tracing::info!(env = %cli.env, "Starting refitt-auth {}", VERSION);

    let service = connect(&config).await?;
    let output = run(&service, cli.command).await?;
    emit(output)
}

async fn connect(config: &AppConfig) -> Result<CredentialService> {
    let url = config
        .postgres_url
        .as_deref()
        .context("Missing 'postgres_url' in configuration")?;
    let db = Database::connect(url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let store = PgCredentialStore::new(Arc::new(db));
    store.init_schema().await?;
    Ok(CredentialService::from_config(Arc::new(store), &config.api)?)
}

async fn run(service: &CredentialService, command: Command) -> Result<Value> {
    let output = match command {
        Command::GenerateNewRootKey => new_rootkey(),
        Command::GenerateNewCredentials(args) => {
            let existing = service
                .store()
                .find_client_by_user_id(args.user_id)
                .await?;
            let issued = match existing {
                Some(client) => {
                    if let Some(level) = args.level {
                        bail!(
                            "user_id={} already has a client at level {}; \
                             --level cannot be changed on rotation (requested {})",
                            client.user_id,
                            client.level,
                            level
                        );
                    }
                    service.rotate_key_and_secret(&client).await?
                }
                None => {
                    service
                        .issue_client(args.user_id, args.level.map(Level))
                        .await?
                }
            };
            json!({
                "client_id": issued.client.id,
                "user_id": issued.client.user_id,
                "level": issued.client.level,
                "key": issued.key.expose(),
                "secret": issued.secret.expose(),
            })
        }
        Command::GenerateNewSecret(args) => {
            let client = service.client_for_user(args.user_id).await?;
            let issued = service.rotate_secret(&client).await?;
            json!({
                "client_id": issued.client.id,
                "key": issued.key.expose(),
                "secret": issued.secret.expose(),
            })
        }
        Command::GenerateNewSessionToken(args) => {
            let client = service.client_for_user(args.user_id).await?;
            let ttl = match (args.forever, args.ttl) {
                (true, _) => SessionTtl::Never,
                (false, Some(secs)) => SessionTtl::seconds(secs),
                (false, None) => service.default_ttl(),
            };
            let issued = service.issue_or_refresh_session(&client, ttl).await?;
            json!({
                "client_id": client.id,
                "token": issued.token.expose(),
                "expires": issued.claim.expiration(),
            })
        }
        Command::RevokeCredentials(args) => {
            let client = service.client_for_user(args.user_id).await?;
            let client = service.revoke(&client).await?;
            json!({
                "client_id": client.id,
                "user_id": client.user_id,
                "valid": client.valid,
            })
        }
    };
    Ok(output)
}

fn new_rootkey() -> Value {
    json!({ "rootkey": Cipher::new_rootkey().expose() })
}

fn emit(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use refitt_auth::credential::MemoryCredentialStore;
    use refitt_auth::{AuthError, AuthErrorCode, Key, Secret};

    fn service() -> CredentialService {
        let cipher = Cipher::new(&Cipher::new_rootkey()).unwrap();
        CredentialService::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(cipher),
            SessionTtl::seconds(900),
            Level::DEFAULT,
        )
    }

    fn command(args: &[&str]) -> Command {
        let argv = std::iter::once("refitt-auth").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap().command
    }

    async fn exec(svc: &CredentialService, args: &[&str]) -> Result<Value> {
        run(svc, command(args)).await
    }

    fn auth_code(err: &anyhow::Error) -> Option<AuthErrorCode> {
        err.downcast_ref::<AuthError>().map(|e| e.code)
    }

    #[test]
    fn test_cli_parses_global_env_after_subcommand() {
        let cli = Cli::try_parse_from([
            "refitt-auth",
            "generate-new-secret",
            "--user-id",
            "42",
            "--env",
            "prod",
        ])
        .unwrap();
        assert_eq!(cli.env, "prod");
        assert!(matches!(cli.command, Command::GenerateNewSecret(UserArgs { user_id: 42 })));
    }

    #[test]
    fn test_cli_ttl_conflicts_with_forever() {
        let result = Cli::try_parse_from([
            "refitt-auth",
            "generate-new-session-token",
            "--user-id",
            "1",
            "--ttl",
            "60",
            "--forever",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_generate_new_root_key() {
        let out = exec(&service(), &["generate-new-root-key"]).await.unwrap();
        let rootkey = out["rootkey"].as_str().unwrap();
        assert_eq!(rootkey.len(), 44);
        assert!(Cipher::new(&refitt_auth::RootKey::new(rootkey).unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_generate_new_credentials_then_rotate() {
        let svc = service();
        let first = exec(&svc, &["generate-new-credentials", "--user-id", "42", "--level", "0"])
            .await
            .unwrap();
        assert_eq!(first["user_id"], 42);
        assert_eq!(first["level"], 0);
        let first_key = Key::new(first["key"].as_str().unwrap()).unwrap();
        let first_secret = Secret::new(first["secret"].as_str().unwrap()).unwrap();
        let stored = svc.store().find_client_by_key(&first_key).await.unwrap().unwrap();
        assert!(first_secret.equals(&stored.secret_hash));

        let second = exec(&svc, &["generate-new-credentials", "--user-id", "42"])
            .await
            .unwrap();
        assert_eq!(second["client_id"], first["client_id"]);
        assert_eq!(second["level"], 0);
        assert_ne!(second["key"], first["key"]);
        assert!(svc.store().find_client_by_key(&first_key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_level_rejected_when_rotating() {
        let svc = service();
        let first = exec(&svc, &["generate-new-credentials", "--user-id", "42"])
            .await
            .unwrap();

        let err = exec(&svc, &["generate-new-credentials", "--user-id", "42", "--level", "0"])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--level cannot be changed"));

        // nothing rotated
        let key = Key::new(first["key"].as_str().unwrap()).unwrap();
        let stored = svc.store().find_client_by_key(&key).await.unwrap().unwrap();
        assert_eq!(stored.level, Level::DEFAULT);
    }

    #[tokio::test]
    async fn test_generate_new_secret_keeps_key() {
        let svc = service();
        let first = exec(&svc, &["generate-new-credentials", "--user-id", "7"])
            .await
            .unwrap();
        let out = exec(&svc, &["generate-new-secret", "--user-id", "7"])
            .await
            .unwrap();
        assert_eq!(out["key"], first["key"]);
        assert_ne!(out["secret"], first["secret"]);
    }

    #[tokio::test]
    async fn test_generate_new_secret_after_revoke_stays_revoked() {
        let svc = service();
        exec(&svc, &["generate-new-credentials", "--user-id", "7"])
            .await
            .unwrap();
        let revoked = exec(&svc, &["revoke-credentials", "--user-id", "7"])
            .await
            .unwrap();
        assert_eq!(revoked["valid"], false);

        exec(&svc, &["generate-new-secret", "--user-id", "7"])
            .await
            .unwrap();
        assert!(!svc.client_for_user(7).await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_generate_new_session_token() {
        let svc = service();
        exec(&svc, &["generate-new-credentials", "--user-id", "9"])
            .await
            .unwrap();

        let out = exec(&svc, &["generate-new-session-token", "--user-id", "9", "--forever"])
            .await
            .unwrap();
        assert!(out["expires"].is_null());
        let token = refitt_auth::Token::new(out["token"].as_str().unwrap()).unwrap();
        let claim = refitt_auth::Claim::decrypt(&token, svc.cipher()).unwrap();
        assert_eq!(Value::from(claim.subject()), out["client_id"]);

        let out = exec(&svc, &["generate-new-session-token", "--user-id", "9", "--ttl", "60"])
            .await
            .unwrap();
        assert!(out["expires"].is_string());
    }

    #[tokio::test]
    async fn test_commands_for_unknown_user() {
        let svc = service();
        for args in [
            &["generate-new-secret", "--user-id", "5"][..],
            &["generate-new-session-token", "--user-id", "5"][..],
            &["revoke-credentials", "--user-id", "5"][..],
        ] {
            let err = exec(&svc, args).await.unwrap_err();
            assert_eq!(auth_code(&err), Some(AuthErrorCode::ClientNotFound));
        }
    }
}
