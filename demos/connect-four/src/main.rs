use std::error::Error;

use tandem::prelude::*;
use tracing::info;

type DemoResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// Columns played in order, host first. The host stacks column 3 and wins
/// on its fourth piece.
const SCRIPT: [usize; 7] = [3, 4, 3, 4, 3, 2, 3];

/// Waits up to ten seconds for an event matching `pred`.
async fn wait_for<F>(sub: &mut Subscription<GameEvent>, mut pred: F) -> DemoResult<SessionEvent<GameEvent>>
where
    F: FnMut(&SessionEvent<GameEvent>) -> bool,
{
    let found = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = sub.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await?;
    found.ok_or_else(|| "session stopped".into())
}

fn named(e: &SessionEvent<GameEvent>) -> bool {
    matches!(e, SessionEvent::Protocol(GameEvent::OpponentNamed(_)))
}

/// Runs a relay-backed game between two local peers and returns the final
/// state.
async fn play_scripted(relay_url: &str) -> DemoResult<GameState> {
    let builder = TandemBuilder::new();
    let host = builder.spawn_game(WebSocketSignaling::connect(relay_url).await?, "Ada");
    let guest = builder.spawn_game(WebSocketSignaling::connect(relay_url).await?, "Bob");
    let mut host_events = host.subscribe().await?;
    let mut guest_events = guest.subscribe().await?;

    let code = host.host().await?;
    info!(%code, "hosting, share this code");
    guest.join(code).await?;
    wait_for(&mut host_events, named).await?;
    wait_for(&mut guest_events, named).await?;

    for (i, &column) in SCRIPT.iter().enumerate() {
        let (mover, watcher) = if i % 2 == 0 {
            (&host, &mut guest_events)
        } else {
            (&guest, &mut host_events)
        };
        let row = mover.play(column).await?;
        let turn = mover.state().await?.turn;
        info!(player = ?mover.me().await?, column, row, turn, "move");
        wait_for(watcher, |e| {
            matches!(e, SessionEvent::Protocol(GameEvent::Moved { turn: t, .. }) if *t == turn)
        })
        .await?;
    }

    let state = guest.state().await?;
    host.shutdown().await?;
    guest.shutdown().await?;
    Ok(state)
}

fn describe(outcome: Outcome) -> String {
    match outcome {
        Outcome::Won(player) => format!("{player} wins"),
        Outcome::Draw => "draw".into(),
        Outcome::InProgress => "unfinished".into(),
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> DemoResult<()> {
    tandem::logging::init();
    let bind = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:0".into());

    let relay = RelayServer::bind(&bind).await?;
    let url = format!("ws://{}", relay.local_addr()?);
    tokio::spawn(async move {
        if let Err(e) = relay.run().await {
            tracing::error!(error = %e, "relay stopped");
        }
    });

    let state = play_scripted(&url).await?;
    println!("{}", state.board);
    println!("{} after {} moves", describe(state.outcome), state.history.len());
    Ok(())
}
