//! Maps validated CLI matches to the action the binary runs.

use crate::cli::actions::{session::Args, Action};
use crate::cli::commands::{backend, session};
use anyhow::Result;

/// Map validated CLI matches to a session action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let backend = backend::Options::parse(matches)?;
    let task = session::parse(matches)?;

    Ok(Action::Session(Args {
        config: backend.config,
        offline: backend.offline,
        task,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::actions::session::Task;

    #[test]
    fn offline_status_dispatches() {
        temp_env::with_vars([("COMPENDIUM_PROVIDER_URL", None::<&str>)], || {
            let matches = crate::cli::commands::new()
                .try_get_matches_from(vec!["compendium", "--offline", "status"])
                .ok();
            let action = matches.as_ref().map(handler);
            match action {
                Some(Ok(Action::Session(args))) => {
                    assert!(args.offline);
                    assert!(matches!(args.task, Task::Status));
                }
                other => panic!("unexpected dispatch result: {other:?}"),
            }
        });
    }

    #[test]
    fn provider_url_required() {
        temp_env::with_vars(
            [
                ("COMPENDIUM_PROVIDER_URL", None::<&str>),
                ("COMPENDIUM_OFFLINE", None::<&str>),
            ],
            || {
                let matches = crate::cli::commands::new()
                    .try_get_matches_from(vec!["compendium", "logout"])
                    .ok();
                let result = matches.as_ref().map(handler);
                assert!(matches!(result, Some(Err(_))));
            },
        );
    }
}
