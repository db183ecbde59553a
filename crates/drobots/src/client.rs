//! One full client run: bootstrap, login, wait for the match, tear down.

use std::future::Future;

use drobots_protocol::MatchOutcome;
use drobots_session::{ClientConfig, EXTERNAL_INTERRUPT, SessionManager};

use crate::DrobotsError;

/// Plays one match with `config` and returns how it ended.
///
/// `interrupt` is the local shutdown signal. It is polled from the start,
/// so it is honoured during bootstrap and login as well as while waiting
/// for the match: whenever it resolves first, the run ends as
/// `Aborted { reason: "external-interrupt" }`. Teardown always runs once
/// bootstrap has succeeded, whether login worked or not.
///
/// # Errors
/// Any startup or login failure. Nothing is retried.
pub async fn run<F>(config: &ClientConfig, interrupt: F) -> Result<MatchOutcome, DrobotsError>
where
    F: Future<Output = ()>,
{
    let mut interrupt = std::pin::pin!(interrupt);

    let mut manager = tokio::select! {
        biased;
        bootstrapped = SessionManager::bootstrap(config) => bootstrapped?,
        () = &mut interrupt => {
            tracing::info!("interrupted during bootstrap");
            return Ok(MatchOutcome::aborted(EXTERNAL_INTERRUPT));
        }
    };

    let player_name = manager.config().player_name.clone();
    let logged_in = tokio::select! {
        biased;
        result = manager.login(&player_name) => Some(result),
        () = &mut interrupt => None,
    };

    let outcome = match logged_in {
        Some(Ok(())) => manager.await_termination(&mut interrupt).await,
        Some(Err(e)) => {
            manager.teardown().await;
            return Err(e.into());
        }
        // The interrupt has fired and must not be polled again.
        None => {
            tracing::info!("interrupted during login");
            manager.await_termination(std::future::ready(())).await
        }
    };
    manager.teardown().await;
    Ok(outcome?)
}
