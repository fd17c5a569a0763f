use crate::{
    config::AuthConfig,
    profile::ProfileRepository,
    provider::{
        http::HttpProviderFactory,
        memory::{MemoryBackend, MemoryProviderFactory},
        Credentials, ProviderFactory, SignInOptions,
    },
    session::SessionStore,
    storage::{PersistentStorage, StorageSet, VolatileStorage},
};
use anyhow::{anyhow, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::debug;

const PROFILE_WAIT: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub enum Task {
    SignUp(Credentials),
    Login {
        credentials: Credentials,
        remember_me: bool,
    },
    Logout,
    Status,
    ResetPassword {
        email: String,
    },
    Recover {
        link: String,
        new_password: SecretString,
    },
}

#[derive(Debug)]
pub struct Args {
    pub config: AuthConfig,
    pub offline: bool,
    pub task: Task,
}

/// Execute a session task and print its one-line outcome.
///
/// # Errors
/// Returns the provider's user-facing message if the task fails.
pub async fn execute(args: Args) -> Result<()> {
    let store = build_store(&args)?;
    let line = run(&store, args.task).await?;
    println!("{line}");
    Ok(())
}

fn build_store(args: &Args) -> Result<SessionStore> {
    let storages = StorageSet::new(
        Arc::new(PersistentStorage::new(args.config.data_dir().clone())),
        Arc::new(VolatileStorage::new()),
    );

    let (factory, profiles): (Arc<dyn ProviderFactory>, Arc<dyn ProfileRepository>) =
        if args.offline {
            let backend = MemoryBackend::new();
            // Nothing survives between offline runs, so a login brings its own account.
            if let Task::Login { credentials, .. } = &args.task {
                backend.register(&credentials.email, credentials.password.expose_secret());
            }
            let factory =
                MemoryProviderFactory::with_storage_key(Arc::clone(&backend), args.config.storage_key());
            (
                Arc::new(factory) as Arc<dyn ProviderFactory>,
                backend as Arc<dyn ProfileRepository>,
            )
        } else {
            let factory = HttpProviderFactory::new(&args.config)
                .map_err(|err| anyhow!("{}", err.friendly_message()))?;
            let profiles = Arc::new(factory.profiles());
            (
                Arc::new(factory) as Arc<dyn ProviderFactory>,
                profiles as Arc<dyn ProfileRepository>,
            )
        };

    debug!(data_dir = %args.config.data_dir().display(), offline = args.offline, "session store ready");
    Ok(SessionStore::new(
        args.config.clone(),
        factory,
        storages,
        profiles,
    ))
}

/// Runs one task against an initialized store.
///
/// # Errors
/// Returns the provider's user-facing message if the task fails.
pub async fn run(store: &SessionStore, task: Task) -> Result<String> {
    store.initialize().await;
    let friendly = |err: crate::error::ProviderError| anyhow!("{}", err.friendly_message());

    let line = match task {
        Task::SignUp(credentials) => {
            store.sign_up(&credentials).await.map_err(friendly)?;
            format!("account created for {}", credentials.email)
        }
        Task::Login {
            credentials,
            remember_me,
        } => {
            store
                .sign_in_with_email(&credentials, SignInOptions { remember_me })
                .await
                .map_err(friendly)?;
            if remember_me {
                format!("signed in as {}", credentials.email)
            } else {
                format!(
                    "signed in as {} (session ends with this process)",
                    credentials.email
                )
            }
        }
        Task::Logout => {
            if !store.is_authenticated() {
                return Ok("not signed in".to_string());
            }
            store.sign_out().await.map_err(friendly)?;
            "signed out".to_string()
        }
        Task::Status => status_line(store).await,
        Task::ResetPassword { email } => {
            store
                .send_password_reset_email(&email)
                .await
                .map_err(friendly)?;
            format!("if {email} has an account, a recovery link is on its way")
        }
        Task::Recover { link, new_password } => {
            store.open_recovery_link(&link).await.map_err(friendly)?;
            store
                .update_password(&new_password)
                .await
                .map_err(friendly)?;
            store.sign_out().await.map_err(friendly)?;
            "password updated, sign in again with the new password".to_string()
        }
    };
    Ok(line)
}

async fn status_line(store: &SessionStore) -> String {
    let Some(identity) = store.identity() else {
        return "signed out".to_string();
    };

    let mut rx = store.subscribe();
    // A missing profile row is not an error here; report what arrived in time.
    let _ = timeout(
        PROFILE_WAIT,
        rx.wait_for(|state| state.profile.is_some() || !state.is_authenticated()),
    )
    .await;

    let mode = store
        .storage_mode()
        .await
        .map_or_else(|| "unknown".to_string(), |mode| mode.to_string());
    match store.profile() {
        Some(profile) => format!(
            "signed in as {} ({}, {:?}, {mode} storage)",
            identity.email,
            profile.username.as_deref().unwrap_or("no username"),
            profile.role
        ),
        None => format!("signed in as {} ({mode} storage)", identity.email),
    }
}
