//! End-to-end tests: `drobots::run` against an in-process coordinator.

use std::sync::Arc;
use std::time::Duration;

use drobots::prelude::*;
use tokio::sync::Mutex;

/// Accepts logins and, once a player is in, asks it for one unit and
/// reports `outcome`.
struct ScriptedGame {
    communicator: Arc<Communicator>,
    outcome: Option<MatchOutcome>,
    reject: bool,
    units: Arc<Mutex<Vec<ObjectRef>>>,
}

impl ScriptedGame {
    fn new(outcome: Option<MatchOutcome>) -> Self {
        Self {
            communicator: Arc::new(Communicator::new()),
            outcome,
            reject: false,
            units: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Servant for ScriptedGame {
    fn interface(&self) -> &'static str {
        GAME_TYPE_ID
    }

    fn dispatch(&self, call: Call) -> BoxFuture<'_, Result<ReplyValue, RemoteError>> {
        Box::pin(async move {
            let player = match call {
                Call::Login { player, .. } => player,
                other => return Err(self.unsupported(&other)),
            };
            if self.reject {
                return Err(RemoteError::LoginRejected {
                    reason: "match full".into(),
                });
            }

            // Call back only after the login reply has gone out.
            let communicator = Arc::clone(&self.communicator);
            let units = Arc::clone(&self.units);
            let outcome = self.outcome.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let player = communicator.proxy(&player).await.unwrap();
                let unit = player
                    .invoke(Call::CreateUnit {
                        request_id: "u1".into(),
                    })
                    .await
                    .unwrap();
                if let ReplyValue::Object(unit) = unit {
                    units.lock().await.push(unit);
                }
                if let Some(outcome) = outcome {
                    player.invoke(Call::ReportOutcome { outcome }).await.unwrap();
                }
            });
            Ok(ReplyValue::Unit)
        })
    }
}

async fn host(game: ScriptedGame) -> (ObjectAdapter, ObjectRef, Arc<Mutex<Vec<ObjectRef>>>) {
    let units = Arc::clone(&game.units);
    let adapter = ObjectAdapter::bind("127.0.0.1:0").await.unwrap();
    let game_ref = adapter
        .add(Identity::new("game").unwrap(), Arc::new(game))
        .await
        .unwrap();
    adapter.activate().await.unwrap();
    (adapter, game_ref, units)
}

fn config_for(game: &ObjectRef) -> ClientConfig {
    ClientConfig {
        game_proxy: Some(game.to_string()),
        adapter_endpoint: Some("127.0.0.1:0".into()),
        player_name: Some("rusty".into()),
        login_timeout_ms: Some(1000),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_run_returns_reported_outcome() {
    let (_coordinator, game_ref, units) = host(ScriptedGame::new(Some(MatchOutcome::Win))).await;

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        drobots::run(&config_for(&game_ref), std::future::pending()),
    )
    .await
    .expect("match ends")
    .unwrap();

    assert_eq!(outcome, MatchOutcome::Win);
    assert_eq!(units.lock().await.len(), 1);
}

#[tokio::test]
async fn test_run_interrupted_returns_aborted() {
    let (_coordinator, game_ref, _units) = host(ScriptedGame::new(None)).await;

    let outcome = drobots::run(
        &config_for(&game_ref),
        tokio::time::sleep(Duration::from_millis(200)),
    )
    .await
    .unwrap();

    assert_eq!(outcome, MatchOutcome::aborted(EXTERNAL_INTERRUPT));
}

#[tokio::test]
async fn test_run_login_rejected_returns_session_error() {
    let mut game = ScriptedGame::new(None);
    game.reject = true;
    let (_coordinator, game_ref, _units) = host(game).await;

    let result = drobots::run(&config_for(&game_ref), std::future::pending()).await;
    match result {
        Err(err @ DrobotsError::Session(SessionError::LoginRejected { .. })) => {
            assert_eq!(err.category(), "LoginRejectedError");
        }
        other => panic!("expected LoginRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_run_incomplete_config_returns_configuration_error() {
    let result = drobots::run(&ClientConfig::default(), std::future::pending()).await;
    assert!(matches!(
        result,
        Err(DrobotsError::Session(SessionError::Configuration(_)))
    ));
}

/// Passes the type check but never answers `Login`.
struct StalledGame;

impl Servant for StalledGame {
    fn interface(&self) -> &'static str {
        GAME_TYPE_ID
    }

    fn dispatch(&self, _call: Call) -> BoxFuture<'_, Result<ReplyValue, RemoteError>> {
        Box::pin(std::future::pending())
    }
}

#[tokio::test]
async fn test_run_interrupted_during_login_returns_aborted() {
    let adapter = ObjectAdapter::bind("127.0.0.1:0").await.unwrap();
    let game_ref = adapter
        .add(Identity::new("game").unwrap(), Arc::new(StalledGame))
        .await
        .unwrap();
    adapter.activate().await.unwrap();

    let config = ClientConfig {
        login_timeout_ms: Some(10_000),
        ..config_for(&game_ref)
    };
    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        drobots::run(&config, tokio::time::sleep(Duration::from_millis(200))),
    )
    .await
    .expect("interrupt must cut the login short")
    .unwrap();

    assert_eq!(outcome, MatchOutcome::aborted(EXTERNAL_INTERRUPT));
}

#[tokio::test]
async fn test_run_interrupted_during_bootstrap_returns_aborted() {
    // Accepts TCP but never completes the WebSocket upgrade.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _held = tokio::spawn(async move {
        let mut sockets = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            sockets.push(socket);
        }
    });

    let config = ClientConfig {
        game_proxy: Some(format!("game@ws://{addr}")),
        login_timeout_ms: Some(10_000),
        ..config_for(&"game@ws://127.0.0.1:1".parse().unwrap())
    };
    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        drobots::run(&config, tokio::time::sleep(Duration::from_millis(200))),
    )
    .await
    .expect("interrupt must cut bootstrap short")
    .unwrap();

    assert_eq!(outcome, MatchOutcome::aborted(EXTERNAL_INTERRUPT));
}
