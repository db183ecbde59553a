use std::sync::Arc;
use std::time::Duration;

use drobots::prelude::*;
use tokio::sync::Mutex;

const UNITS_PER_PLAYER: usize = 4;
const TURNS: usize = 3;

// ---------------------------------------------------------------------------
// Match record
// ---------------------------------------------------------------------------

/// What the coordinator saw during the match.
#[derive(Debug, Default)]
struct MatchLog {
    player: Option<String>,
    units: Vec<ObjectRef>,
    duplicate_matched: bool,
    over_capacity_rejected: bool,
    turns_played: usize,
    outcome: Option<MatchOutcome>,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// A one-player coordinator. Admits the first login, then plays a short
/// scripted match against it on a separate task.
struct LocalGame {
    communicator: Arc<Communicator>,
    log: Arc<Mutex<MatchLog>>,
}

impl Servant for LocalGame {
    fn interface(&self) -> &'static str {
        GAME_TYPE_ID
    }

    fn dispatch(&self, call: Call) -> BoxFuture<'_, Result<ReplyValue, RemoteError>> {
        Box::pin(async move {
            let (player, name) = match call {
                Call::Login { player, name } => (player, name),
                other => return Err(self.unsupported(&other)),
            };

            {
                let mut log = self.log.lock().await;
                if log.player.is_some() {
                    return Err(RemoteError::LoginRejected {
                        reason: "match full".into(),
                    });
                }
                log.player = Some(name.clone());
            }
            tracing::info!(%name, %player, "player admitted");

            let communicator = Arc::clone(&self.communicator);
            let log = Arc::clone(&self.log);
            tokio::spawn(async move {
                if let Err(e) = play_match(&communicator, &player, &log).await {
                    tracing::error!(error = %e, "match aborted by coordinator");
                }
            });
            Ok(ReplyValue::Unit)
        })
    }
}

/// Requests units, runs the turns and reports the outcome.
async fn play_match(
    communicator: &Communicator,
    player_ref: &ObjectRef,
    log: &Mutex<MatchLog>,
) -> Result<(), RpcError> {
    // Give the login reply a head start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let player = communicator
        .proxy(player_ref)
        .await?
        .checked_cast(PLAYER_TYPE_ID)
        .await?;

    let mut units = Vec::new();
    for n in 1..=UNITS_PER_PLAYER {
        units.push(create_unit(&player, &format!("unit-{n}")).await?);
    }

    // Redelivery of a request the player already served.
    let again = create_unit(&player, "unit-1").await?;
    let over = create_unit(&player, "unit-extra").await;
    {
        let mut log = log.lock().await;
        log.duplicate_matched = again == units[0];
        log.over_capacity_rejected = matches!(
            over,
            Err(RpcError::Remote(RemoteError::CapacityExceeded { .. }))
        );
        log.units = units.clone();
    }

    let mut controllers = Vec::new();
    for unit in &units {
        controllers.push(
            communicator
                .proxy(unit)
                .await?
                .checked_cast(ROBOT_CONTROLLER_TYPE_ID)
                .await?,
        );
    }

    for turn in 1..=TURNS {
        for controller in &controllers {
            controller.invoke(Call::Turn).await?;
        }
        log.lock().await.turns_played = turn;
        tracing::info!(turn, "turn played");
    }

    // Every unit but the first is lost in the last turn.
    for controller in controllers.iter().skip(1) {
        controller.invoke(Call::UnitDestroyed).await?;
    }

    let outcome = MatchOutcome::Win;
    player
        .invoke(Call::ReportOutcome {
            outcome: outcome.clone(),
        })
        .await?;
    log.lock().await.outcome = Some(outcome);
    Ok(())
}

async fn create_unit(player: &Proxy, request_id: &str) -> Result<ObjectRef, RpcError> {
    match player
        .invoke(Call::CreateUnit {
            request_id: request_id.into(),
        })
        .await?
    {
        ReplyValue::Object(unit) => Ok(unit),
        _ => Err(RpcError::UnexpectedReply {
            operation: "CreateUnit",
        }),
    }
}

/// Hosts the coordinator as `game` on a loopback adapter.
async fn start_coordinator() -> Result<(ObjectAdapter, ObjectRef, Arc<Mutex<MatchLog>>), RpcError> {
    let log = Arc::new(Mutex::new(MatchLog::default()));
    let game = LocalGame {
        communicator: Arc::new(Communicator::new()),
        log: Arc::clone(&log),
    };

    let adapter = ObjectAdapter::bind("127.0.0.1:0").await?;
    let game_ref = adapter.add(Identity::new("game")?, Arc::new(game)).await?;
    adapter.activate().await?;
    Ok((adapter, game_ref, log))
}

fn client_config(game: &ObjectRef, name: &str) -> ClientConfig {
    ClientConfig {
        game_proxy: Some(game.to_string()),
        adapter_endpoint: Some("127.0.0.1:0".into()),
        player_name: Some(name.into()),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    drobots::logging::init_logging(false);

    let (coordinator, game_ref, log) = start_coordinator().await?;
    eprintln!("coordinator listening as {game_ref}");

    let outcome = drobots::run(&client_config(&game_ref, "rusty"), async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    coordinator.deactivate().await;
    let log = log.lock().await;
    eprintln!(
        "match over: {outcome} ({} units, {} turns)",
        log.units.len(),
        log.turns_played
    );
    Ok(())
}
