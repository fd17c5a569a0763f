pub mod backend;
pub mod logging;
pub mod session;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    ColorChoice, Command,
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("compendium")
        .about("Component catalog account and session client")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles);

    let command = backend::with_args(command);
    let command = session::with_subcommands(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "compendium");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Component catalog account and session client".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_login_args() {
        temp_env::with_vars(
            [
                ("COMPENDIUM_EMAIL", None::<&str>),
                ("COMPENDIUM_PASSWORD", None::<&str>),
            ],
            || {
                let matches = new()
                    .try_get_matches_from(vec![
                        "compendium",
                        "--provider-url",
                        "https://project.example.co",
                        "login",
                        "--email",
                        "dev@example.com",
                        "--password",
                        "password1",
                        "--remember-me",
                    ])
                    .ok();
                let sub = matches
                    .as_ref()
                    .and_then(|m| m.subcommand_matches(session::CMD_LOGIN));
                assert_eq!(
                    sub.and_then(|s| s.get_one::<String>(session::ARG_EMAIL))
                        .map(String::as_str),
                    Some("dev@example.com")
                );
                assert_eq!(
                    sub.map(|s| s.get_flag(session::ARG_REMEMBER_ME)),
                    Some(true)
                );
            },
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("COMPENDIUM_PROVIDER_URL", Some("https://project.example.co")),
                ("COMPENDIUM_API_KEY", Some("anon-key")),
                ("COMPENDIUM_SITE_URL", Some("https://catalog.example.dev")),
                ("COMPENDIUM_DATA_DIR", Some("/tmp/compendium-env")),
                ("COMPENDIUM_LOG_LEVEL", Some("info")),
                ("COMPENDIUM_OFFLINE", None),
            ],
            || {
                let matches = new().try_get_matches_from(vec!["compendium", "status"]).ok();
                let options = matches
                    .as_ref()
                    .and_then(|m| backend::Options::parse(m).ok());

                assert_eq!(
                    matches
                        .as_ref()
                        .and_then(|m| m.get_one::<u8>(logging::ARG_VERBOSITY).copied()),
                    Some(2)
                );
                let Some(options) = options else {
                    panic!("backend options should parse from env");
                };
                assert!(!options.offline);
                assert_eq!(options.config.site_url(), "https://catalog.example.dev");
                assert_eq!(options.config.api_key().expose_secret(), "anon-key");
                assert_eq!(
                    options.config.provider_url().map(url::Url::as_str),
                    Some("https://project.example.co/")
                );
                assert_eq!(
                    options.config.data_dir(),
                    &std::path::PathBuf::from("/tmp/compendium-env")
                );
            },
        );
    }

    #[test]
    fn test_provider_url_required_unless_offline() {
        temp_env::with_vars(
            [
                ("COMPENDIUM_PROVIDER_URL", None::<&str>),
                ("COMPENDIUM_OFFLINE", None::<&str>),
            ],
            || {
                let matches = new().try_get_matches_from(vec!["compendium", "status"]).ok();
                let result = matches.as_ref().map(backend::Options::parse);
                assert!(matches!(result, Some(Err(_))));
                if let Some(Err(err)) = result {
                    assert!(err
                        .to_string()
                        .contains("missing required argument: --provider-url"));
                }

                let matches = new()
                    .try_get_matches_from(vec!["compendium", "--offline", "status"])
                    .ok();
                let options = matches.as_ref().and_then(|m| backend::Options::parse(m).ok());
                assert_eq!(options.map(|o| o.offline), Some(true));
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars([("COMPENDIUM_LOG_LEVEL", Some(level))], || {
                let matches = new().try_get_matches_from(vec!["compendium", "status"]).ok();
                assert_eq!(
                    matches.and_then(|m| m.get_one::<u8>(logging::ARG_VERBOSITY).copied()),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_recover_task() {
        temp_env::with_vars([("COMPENDIUM_NEW_PASSWORD", Some("brand-new-pw"))], || {
            let matches = new()
                .try_get_matches_from(vec![
                    "compendium",
                    "--offline",
                    "recover",
                    "--link",
                    "http://localhost:4200/auth/reset-password#type=recovery",
                ])
                .ok();
            let task = matches.as_ref().and_then(|m| session::parse(m).ok());
            match task {
                Some(crate::cli::actions::session::Task::Recover { link, new_password }) => {
                    assert!(link.ends_with("#type=recovery"));
                    assert_eq!(new_password.expose_secret(), "brand-new-pw");
                }
                other => panic!("unexpected task: {other:?}"),
            }
        });
    }
}
