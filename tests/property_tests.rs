//! Property-based tests for tables, history and the engine.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated inputs.

use chrono::Utc;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use waypoint::{
    args, Handler, Machine, State, StateHistory, StateTable, StateTransition, TransitionOutcome,
};

const STATES: [&str; 4] = ["idle", "running", "paused", "done"];

prop_compose! {
    fn arbitrary_state()(index in 0..STATES.len()) -> &'static str {
        STATES[index]
    }
}

prop_compose! {
    fn arbitrary_handler()(variant in 0..3u8, target in arbitrary_state()) -> Handler {
        match variant {
            0 => Handler::Noop,
            1 => Handler::Defer,
            _ => Handler::transition_to(target),
        }
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

fn full_table() -> StateTable {
    StateTable::from_iter(STATES.iter().map(|name| (*name, State::new())))
}

/// Which handler kind a fragment list leaves behind for `event`.
fn expected_kind(fragments: &[Vec<(String, Handler)>], event: &str) -> Option<&'static str> {
    fragments
        .iter()
        .rev()
        .find_map(|fragment| {
            fragment
                .iter()
                .rev()
                .find(|(name, _)| name == event)
                .map(|(_, handler)| handler.kind())
        })
}

proptest! {
    #[test]
    fn history_preserves_order(path in prop::collection::vec(arbitrary_state(), 1..20)) {
        let mut history = StateHistory::with_limit(usize::MAX);
        let mut from: Option<String> = None;
        for to in &path {
            history.record(StateTransition {
                from: from.clone(),
                to: to.to_string(),
                timestamp: Utc::now(),
                outcome: TransitionOutcome::Completed,
            });
            from = Some(to.to_string());
        }

        prop_assert_eq!(history.get_path(), path);
    }

    #[test]
    fn history_never_exceeds_limit(
        limit in 0usize..8,
        path in prop::collection::vec(arbitrary_state(), 0..30),
    ) {
        let mut history = StateHistory::with_limit(limit);
        for to in &path {
            history.record(StateTransition {
                from: None,
                to: to.to_string(),
                timestamp: Utc::now(),
                outcome: TransitionOutcome::Completed,
            });
        }

        prop_assert_eq!(history.len(), path.len().min(limit));
        if let Some(last) = history.last() {
            prop_assert_eq!(Some(last.to.as_str()), path.last().copied());
        }
    }

    #[test]
    fn most_derived_fragment_wins(
        fragments in prop::collection::vec(
            prop::collection::vec(("[a-d]", arbitrary_handler()), 0..5),
            1..5,
        ),
    ) {
        let mut builder = StateTable::builder();
        for name in STATES {
            builder = builder.state(name, State::new());
        }
        for fragment in &fragments {
            let state = fragment
                .iter()
                .fold(State::new(), |state, (event, handler)| state.handle(event.clone(), handler.clone()));
            builder = builder.state("idle", state);
        }
        let table = builder.build().unwrap();
        let idle = table.get("idle").unwrap();

        for event in ["a", "b", "c", "d"] {
            prop_assert_eq!(idle.handler(event).map(Handler::kind), expected_kind(&fragments, event));
        }
    }

    #[test]
    fn any_known_state_can_be_entered(path in prop::collection::vec(arbitrary_state(), 1..10)) {
        let machine = Machine::new(full_table());

        runtime().block_on(async {
            for target in &path {
                prop_assert!(machine.enter(target, args![]).await.unwrap());
                let state = machine.state();
                prop_assert_eq!(state.as_deref(), Some(*target));
            }
            Ok::<(), TestCaseError>(())
        })?;

        let mut collapsed = path.clone();
        collapsed.dedup();
        let history = machine.history();
        prop_assert_eq!(history.get_path(), collapsed);
    }

    #[test]
    fn deferred_events_replay_in_arrival_order(events in prop::collection::vec(0u64..1000, 1..16)) {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let table = StateTable::from_iter([
            ("idle", State::new().defer("job")),
            (
                "running",
                State::new().action("job", move |_ctx, args| {
                    sink.lock().push(args[0].as_u64().unwrap_or_default());
                    async { Ok(serde_json::Value::Null) }
                }),
            ),
        ]);
        let machine = Machine::builder(table).initial("idle").build().unwrap();

        let results = runtime().block_on(async {
            machine.ready().await;
            let mut pending = Vec::new();
            for value in &events {
                let machine = machine.clone();
                let value = *value;
                pending.push(tokio::spawn(async move { machine.process("job", args![value]).await }));
                tokio::task::yield_now().await;
            }
            machine.enter("running", args![]).await.unwrap();
            futures::future::join_all(pending).await
        });

        prop_assert!(results.iter().all(|r| matches!(r, Ok(Ok(_)))));
        prop_assert_eq!(&*seen.lock(), &events);
        prop_assert_eq!(machine.pending_deferred(), 0);
    }

    #[test]
    fn unknown_targets_are_always_rejected(target in "[a-z]{1,8}") {
        prop_assume!(!STATES.contains(&target.as_str()));
        let machine = Machine::new(full_table());

        let err = runtime().block_on(machine.enter(&target, args![])).unwrap_err();

        prop_assert!(err.is_invalid_request());
        prop_assert_eq!(machine.state(), None);
    }
}

#[test]
fn fragment_lists_resolve_like_a_map() {
    let fragments = vec![
        vec![("a".to_string(), Handler::Noop)],
        vec![("a".to_string(), Handler::Defer), ("b".to_string(), Handler::Noop)],
    ];
    let lookup: HashMap<_, _> = ["a", "b", "c"]
        .into_iter()
        .map(|event| (event, expected_kind(&fragments, event)))
        .collect();

    assert_eq!(lookup["a"], Some(Handler::Defer.kind()));
    assert_eq!(lookup["b"], Some(Handler::Noop.kind()));
    assert_eq!(lookup["c"], None);
}
