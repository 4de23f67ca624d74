//! Building a table out of layered fragments.
//!
//! A base job lifecycle is shared by every job kind; a derived layer adds a
//! pause state and overrides how `cancel` is handled while running.

use serde_json::json;
use waypoint::{args, BuildError, Handler, Machine, State, StateTable, TableViolation};

fn base() -> Vec<(&'static str, State)> {
    vec![
        ("queued", State::new().transition("start", "running").transition("cancel", "cancelled")),
        (
            "running",
            State::new()
                .transition("finish", "done")
                .noop("cancel")
                .action("progress", |_ctx, args| async move { Ok(json!({ "progress": args })) }),
        ),
        ("done", State::new().wildcard(Handler::Noop)),
        ("cancelled", State::new().wildcard(Handler::Noop)),
    ]
}

fn pausable() -> Vec<(&'static str, State)> {
    vec![
        (
            "running",
            State::new()
                .transition("pause", "paused")
                .transition("cancel", "cancelled"),
        ),
        (
            "paused",
            State::new()
                .transition("resume", "running")
                .defer("progress")
                .transition("cancel", "cancelled"),
        ),
    ]
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let table = StateTable::builder().fragment(base()).fragment(pausable()).build()?;
    let mut names: Vec<_> = table.names().collect();
    names.sort();
    println!("states: {names:?}");

    let job = Machine::builder(table).name("job-42").initial("queued").build()?;
    job.process("start", args![]).await?;
    job.process("pause", args![]).await?;

    let report = {
        let job = job.clone();
        tokio::spawn(async move { job.process("progress", args![50]).await })
    };
    tokio::task::yield_now().await;
    println!("while paused, pending: {}", job.pending_deferred());

    job.process("resume", args![]).await?;
    println!("replayed: {}", report.await??);

    job.process("cancel", args![]).await?;
    println!("final state: {:?}", job.state());

    let broken = StateTable::builder()
        .fragment(base())
        .state("running", State::new().transition("crash", "exploded"))
        .build();
    if let Err(BuildError::InvalidTable { violations }) = broken {
        for violation in &violations {
            if let TableViolation::DanglingTarget { target, .. } = violation {
                println!("rejected layer: missing state {target}");
            }
        }
    }
    Ok(())
}
