pub mod session;

use anyhow::Result;

#[derive(Debug)]
pub enum Action {
    Session(session::Args),
}

impl Action {
    /// Execute the action.
    ///
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::Session(args) => session::execute(args).await,
        }
    }
}
