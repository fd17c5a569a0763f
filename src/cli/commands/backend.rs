//! Where the session lives: provider endpoint, project key and local storage.

use crate::config::AuthConfig;
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::path::PathBuf;
use url::Url;

pub const ARG_PROVIDER_URL: &str = "provider-url";
pub const ARG_API_KEY: &str = "api-key";
pub const ARG_SITE_URL: &str = "site-url";
pub const ARG_STORAGE_KEY: &str = "storage-key";
pub const ARG_DATA_DIR: &str = "data-dir";
pub const ARG_RESET_REDIRECT_URL: &str = "reset-redirect-url";
pub const ARG_OFFLINE: &str = "offline";

#[derive(Debug, Clone)]
pub struct Options {
    pub config: AuthConfig,
    pub offline: bool,
}

impl Options {
    /// Parse backend arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the provider URL is missing (and not offline) or invalid.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        // Helper to filter empty strings which clap might pass through if env vars are set to ""
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let offline = matches.get_flag(ARG_OFFLINE);
        let site_url = get_non_empty(ARG_SITE_URL).context("missing required argument: --site-url")?;
        let mut config = AuthConfig::new(site_url);

        match get_non_empty(ARG_PROVIDER_URL) {
            Some(url) => {
                let url = Url::parse(&url).with_context(|| format!("invalid --{ARG_PROVIDER_URL}: {url}"))?;
                config = config.with_provider_url(url);
            }
            None if !offline => {
                anyhow::bail!("missing required argument: --{ARG_PROVIDER_URL}")
            }
            None => {}
        }

        if let Some(key) = get_non_empty(ARG_API_KEY) {
            config = config.with_api_key(SecretString::from(key));
        }
        if let Some(key) = get_non_empty(ARG_STORAGE_KEY) {
            config = config.with_storage_key(key);
        }
        if let Some(dir) = get_non_empty(ARG_DATA_DIR) {
            config = config.with_data_dir(PathBuf::from(dir));
        }
        if let Some(url) = get_non_empty(ARG_RESET_REDIRECT_URL) {
            config = config.with_reset_redirect_url(url);
        }

        Ok(Self { config, offline })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROVIDER_URL)
                .long(ARG_PROVIDER_URL)
                .help("Base URL of the hosted auth and data backend")
                .env("COMPENDIUM_PROVIDER_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_API_KEY)
                .long(ARG_API_KEY)
                .help("Project API key sent with every backend request")
                .env("COMPENDIUM_API_KEY")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new(ARG_SITE_URL)
                .long(ARG_SITE_URL)
                .help("Public origin of the catalog UI")
                .env("COMPENDIUM_SITE_URL")
                .default_value("http://localhost:4200")
                .global(true),
        )
        .arg(
            Arg::new(ARG_STORAGE_KEY)
                .long(ARG_STORAGE_KEY)
                .help("Key the session is stored under")
                .env("COMPENDIUM_STORAGE_KEY")
                .global(true),
        )
        .arg(
            Arg::new(ARG_DATA_DIR)
                .long(ARG_DATA_DIR)
                .help("Directory for remembered sessions")
                .long_help(
                    "Directory for remembered sessions. Defaults to $XDG_DATA_HOME/compendium, then $HOME/.local/share/compendium.",
                )
                .env("COMPENDIUM_DATA_DIR")
                .global(true),
        )
        .arg(
            Arg::new(ARG_RESET_REDIRECT_URL)
                .long(ARG_RESET_REDIRECT_URL)
                .help("Page password-reset mails link to (default: <site-url>/auth/reset-password)")
                .env("COMPENDIUM_RESET_REDIRECT_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_OFFLINE)
                .long(ARG_OFFLINE)
                .help("Use an in-process backend instead of the network")
                .env("COMPENDIUM_OFFLINE")
                .global(true)
                .action(ArgAction::SetTrue),
        )
}
