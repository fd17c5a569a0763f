//! Subcommands acting on the session.

use crate::cli::actions::session::Task;
use crate::provider::Credentials;
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const CMD_SIGNUP: &str = "signup";
pub const CMD_LOGIN: &str = "login";
pub const CMD_LOGOUT: &str = "logout";
pub const CMD_STATUS: &str = "status";
pub const CMD_RESET_PASSWORD: &str = "reset-password";
pub const CMD_RECOVER: &str = "recover";

pub const ARG_EMAIL: &str = "email";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_REMEMBER_ME: &str = "remember-me";
pub const ARG_LINK: &str = "link";
pub const ARG_NEW_PASSWORD: &str = "new-password";

fn email_arg() -> Arg {
    Arg::new(ARG_EMAIL)
        .short('e')
        .long(ARG_EMAIL)
        .help("Account email")
        .env("COMPENDIUM_EMAIL")
        .required(true)
}

fn password_arg() -> Arg {
    Arg::new(ARG_PASSWORD)
        .short('p')
        .long(ARG_PASSWORD)
        .help("Account password")
        .env("COMPENDIUM_PASSWORD")
        .hide_env_values(true)
        .required(true)
}

#[must_use]
pub fn with_subcommands(command: Command) -> Command {
    command
        .subcommand_required(true)
        .subcommand(
            Command::new(CMD_SIGNUP)
                .about("Create an account")
                .arg(email_arg())
                .arg(password_arg()),
        )
        .subcommand(
            Command::new(CMD_LOGIN)
                .about("Sign in with email and password")
                .arg(email_arg())
                .arg(password_arg())
                .arg(
                    Arg::new(ARG_REMEMBER_ME)
                        .long(ARG_REMEMBER_ME)
                        .help("Keep the session after this process exits")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new(CMD_LOGOUT).about("Sign out of the remembered session"))
        .subcommand(Command::new(CMD_STATUS).about("Show the current session"))
        .subcommand(
            Command::new(CMD_RESET_PASSWORD)
                .about("Mail a password recovery link")
                .arg(email_arg()),
        )
        .subcommand(
            Command::new(CMD_RECOVER)
                .about("Set a new password from a recovery link, then sign out")
                .arg(
                    Arg::new(ARG_LINK)
                        .long(ARG_LINK)
                        .help("Recovery link as received by mail")
                        .required(true),
                )
                .arg(
                    Arg::new(ARG_NEW_PASSWORD)
                        .long(ARG_NEW_PASSWORD)
                        .help("New account password")
                        .env("COMPENDIUM_NEW_PASSWORD")
                        .hide_env_values(true)
                        .required(true),
                ),
        )
}

/// Map the selected subcommand to a session task.
///
/// # Errors
/// Returns an error if no known subcommand was given or an argument is missing.
pub fn parse(matches: &ArgMatches) -> Result<Task> {
    let (name, sub) = matches.subcommand().context("missing subcommand")?;
    let value = |id: &str| {
        sub.get_one::<String>(id)
            .cloned()
            .with_context(|| format!("missing required argument: --{id}"))
    };
    let credentials = || -> Result<Credentials> {
        Ok(Credentials::new(value(ARG_EMAIL)?, value(ARG_PASSWORD)?))
    };

    let task = match name {
        CMD_SIGNUP => Task::SignUp(credentials()?),
        CMD_LOGIN => Task::Login {
            credentials: credentials()?,
            remember_me: sub.get_flag(ARG_REMEMBER_ME),
        },
        CMD_LOGOUT => Task::Logout,
        CMD_STATUS => Task::Status,
        CMD_RESET_PASSWORD => Task::ResetPassword {
            email: value(ARG_EMAIL)?,
        },
        CMD_RECOVER => Task::Recover {
            link: value(ARG_LINK)?,
            new_password: SecretString::from(value(ARG_NEW_PASSWORD)?),
        },
        other => anyhow::bail!("unknown subcommand: {other}"),
    };
    Ok(task)
}
