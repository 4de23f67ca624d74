//! Coin-operated turnstile.
//!
//! Pushes that arrive while the turnstile is locked wait for the next coin
//! instead of being rejected. Run with `RUST_LOG=waypoint=debug` to see the
//! engine's own logging.

use serde_json::json;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use waypoint::{args, BroadcastObserver, Machine, MachineConfig, State, StateHandlers, StateTable};

fn init_logging() {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_filter(EnvFilter::new(level)),
    );
    if subscriber.try_init().is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}

fn table() -> StateTable {
    StateTable::from_iter([
        (
            "locked",
            State::new()
                .on_entry(|_ctx, _args| async {
                    tracing::info!("turnstile locked");
                    Ok(())
                })
                .transition("coin", "unlocked")
                .defer("push"),
        ),
        (
            "unlocked",
            State::new()
                .action("push", |ctx, args| async move {
                    let who = args.first().and_then(|v| v.as_str()).unwrap_or("someone");
                    ctx.schedule("locked", args![]);
                    Ok(json!(format!("{who} went through")))
                })
                .noop("coin"),
        ),
    ])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = MachineConfig::from_json(r#"{ "name": "turnstile", "initial_state": "locked" }"#)?;
    let signals = BroadcastObserver::default();
    let mut feed = signals.subscribe();
    let machine = Machine::builder(table()).config(config).observer(signals).build()?;

    let watcher = tokio::spawn(async move {
        while let Ok(signal) = feed.recv().await {
            tracing::info!(signal = %signal.kind.label(), "signal");
        }
    });

    let status = machine.event_handler(
        StateHandlers::new("status")
            .on("locked", waypoint::Action::sync(|_, _| Ok(json!("insert a coin"))))
            .fallback(waypoint::Action::sync(|_, _| Ok(json!("go ahead")))),
    );
    println!("status: {}", status.call(args![]).await?);

    let waiting = {
        let machine = machine.clone();
        tokio::spawn(async move { machine.process("push", args!["alice"]).await })
    };
    tokio::task::yield_now().await;
    println!("deferred pushes: {}", machine.pending_deferred());

    machine.process("coin", args![]).await?;
    println!("{}", waiting.await??);
    println!("state after push: {:?}", machine.ready().await);

    let (done, result) = tokio::sync::oneshot::channel();
    machine
        .callback_event_handler("push")
        .call_with(args!["bob"], move |outcome| {
            let _ = done.send(outcome);
        });
    machine.process("coin", args![]).await?;
    println!("{}", result.await??);

    println!("path: {:?}", machine.history().get_path());
    drop(machine);
    watcher.abort();
    Ok(())
}
