//! `forgeloop run`: plan and execute one request, then exit.

use forgeloop_agent::RequestOutcome;
use forgeloop_config::AppConfig;

use crate::runtime;
use crate::terminal::{LineReader, TerminalPresenter};

pub async fn run(
    config: &AppConfig,
    message: &str,
    yes: bool,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut orchestrator = runtime::build_orchestrator(config, verbose).await?;

    let presenter = TerminalPresenter::new(LineReader::spawn());
    let presenter = if yes { presenter.auto_confirming() } else { presenter };

    match orchestrator.handle_request(message, &presenter).await? {
        RequestOutcome::Executed { completed, total } if completed < total => {
            Err(format!("{} of {total} tasks failed", total - completed).into())
        }
        _ => Ok(()),
    }
}
