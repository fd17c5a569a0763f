//! Client configuration: provider endpoint, storage location and routes.
//! The API key is public project configuration but is still kept out of logs.

use crate::provider::memory::DEFAULT_STORAGE_KEY;
use secrecy::SecretString;
use std::{env, path::PathBuf};
use url::Url;

const DEFAULT_SITE_URL: &str = "http://localhost:4200";
const RESET_PASSWORD_PATH: &str = "/auth/reset-password";
const DEFAULT_LOGIN_ROUTE: &str = "/auth/login";
const DEFAULT_HOME_ROUTE: &str = "/";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    site_url: String,
    provider_url: Option<Url>,
    api_key: SecretString,
    storage_key: String,
    data_dir: PathBuf,
    reset_redirect_url: Option<String>,
    login_route: String,
    home_route: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(site_url: String) -> Self {
        // Ensure the origin does not have a trailing slash
        let site_url = site_url.trim_end_matches('/').to_string();

        Self {
            site_url,
            provider_url: None,
            api_key: SecretString::default(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            data_dir: default_data_dir(),
            reset_redirect_url: None,
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            home_route: DEFAULT_HOME_ROUTE.to_string(),
        }
    }

    #[must_use]
    pub fn with_provider_url(mut self, url: Url) -> Self {
        self.provider_url = Some(url);
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = api_key;
        self
    }

    #[must_use]
    pub fn with_storage_key(mut self, key: String) -> Self {
        self.storage_key = key;
        self
    }

    #[must_use]
    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        self.data_dir = dir;
        self
    }

    #[must_use]
    pub fn with_reset_redirect_url(mut self, url: String) -> Self {
        self.reset_redirect_url = Some(url);
        self
    }

    #[must_use]
    pub fn with_login_route(mut self, route: String) -> Self {
        self.login_route = route;
        self
    }

    #[must_use]
    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    #[must_use]
    pub fn provider_url(&self) -> Option<&Url> {
        self.provider_url.as_ref()
    }

    #[must_use]
    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    #[must_use]
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Where password-reset mails send the user back to.
    #[must_use]
    pub fn reset_redirect_url(&self) -> String {
        self.reset_redirect_url
            .clone()
            .unwrap_or_else(|| format!("{}{RESET_PASSWORD_PATH}", self.site_url))
    }

    #[must_use]
    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    #[must_use]
    pub fn home_route(&self) -> &str {
        &self.home_route
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SITE_URL.to_string())
    }
}

/// `$XDG_DATA_HOME/compendium`, then `$HOME/.local/share/compendium`, then
/// `./.compendium`.
fn default_data_dir() -> PathBuf {
    data_dir_from(
        env::var_os("XDG_DATA_HOME").map(PathBuf::from),
        env::var_os("HOME").map(PathBuf::from),
    )
}

fn data_dir_from(xdg_data_home: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    let name = env!("CARGO_PKG_NAME");
    if let Some(dir) = xdg_data_home.filter(|dir| dir.is_absolute()) {
        return dir.join(name);
    }
    if let Some(home) = home.filter(|home| !home.as_os_str().is_empty()) {
        return home.join(".local").join("share").join(name);
    }
    PathBuf::from(format!(".{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://catalog.example.dev/".to_string());

        assert_eq!(config.site_url(), "https://catalog.example.dev");
        assert_eq!(
            config.reset_redirect_url(),
            "https://catalog.example.dev/auth/reset-password"
        );
        assert_eq!(config.storage_key(), DEFAULT_STORAGE_KEY);
        assert_eq!(config.login_route(), "/auth/login");
        assert_eq!(config.home_route(), "/");
        assert_eq!(config.provider_url(), None);
        assert_eq!(config.api_key().expose_secret(), "");

        let provider_url = Url::parse("https://project.example.co").ok();
        let mut config = config
            .with_storage_key("sb-project-auth-token".to_string())
            .with_reset_redirect_url("https://elsewhere.dev/reset".to_string())
            .with_login_route("/login".to_string())
            .with_api_key(SecretString::from("anon-key".to_string()))
            .with_data_dir(PathBuf::from("/tmp/compendium-test"));
        if let Some(url) = provider_url.clone() {
            config = config.with_provider_url(url);
        }

        assert_eq!(config.storage_key(), "sb-project-auth-token");
        assert_eq!(config.reset_redirect_url(), "https://elsewhere.dev/reset");
        assert_eq!(config.login_route(), "/login");
        assert_eq!(config.api_key().expose_secret(), "anon-key");
        assert_eq!(config.data_dir(), &PathBuf::from("/tmp/compendium-test"));
        assert_eq!(config.provider_url(), provider_url.as_ref());
    }

    #[test]
    fn api_key_is_not_printed() {
        let config =
            AuthConfig::default().with_api_key(SecretString::from("anon-key".to_string()));
        assert!(!format!("{config:?}").contains("anon-key"));
    }

    #[test]
    fn data_dir_resolution_order() {
        assert_eq!(
            data_dir_from(Some(PathBuf::from("/xdg")), Some(PathBuf::from("/home/u"))),
            PathBuf::from("/xdg/compendium")
        );
        assert_eq!(
            data_dir_from(Some(PathBuf::from("relative")), Some(PathBuf::from("/home/u"))),
            PathBuf::from("/home/u/.local/share/compendium")
        );
        assert_eq!(data_dir_from(None, None), PathBuf::from(".compendium"));
    }
}
