//! Property-based tests for the session store
//!
//! For any sequence of appends, reading the session back yields exactly the
//! appended turns in insertion order, and other sessions are untouched.

use super::{FileStore, Role, SessionStore, Turn};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_turn() -> impl Strategy<Value = Turn> {
    (any::<bool>(), "[a-zA-Z0-9 _.!?,\n`#*]{0,80}").prop_map(|(is_user, text)| {
        if is_user {
            Turn::user(text)
        } else {
            Turn::assistant(text, "rule-based")
        }
    })
}

/// Appends spread across a handful of session ids
fn arb_appends() -> impl Strategy<Value = Vec<(usize, Turn)>> {
    proptest::collection::vec((0usize..3, arb_turn()), 0..25)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_get_returns_turns_in_insertion_order(appends in arb_appends()) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        runtime().block_on(async {
            for (slot, turn) in &appends {
                store.append(&format!("session-{slot}"), turn.clone()).await.unwrap();
            }

            for slot in 0..3 {
                let id = format!("session-{slot}");
                let expected: Vec<&Turn> = appends
                    .iter()
                    .filter(|(s, _)| *s == slot)
                    .map(|(_, t)| t)
                    .collect();

                match store.get(&id).await {
                    Ok(session) => {
                        prop_assert_eq!(session.turns.len(), expected.len());
                        for (got, want) in session.turns.iter().zip(expected) {
                            prop_assert_eq!(got, want);
                        }
                    }
                    Err(_) => prop_assert!(expected.is_empty()),
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_title_comes_from_first_user_turn(appends in proptest::collection::vec(arb_turn(), 1..10)) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        runtime().block_on(async {
            for turn in &appends {
                store.append("titled", turn.clone()).await.unwrap();
            }
            let session = store.get("titled").await.unwrap();
            let expected = appends
                .iter()
                .find(|t| t.role == Role::User)
                .map_or_else(|| super::DEFAULT_TITLE.to_string(), |t| super::derive_title(&t.text));
            prop_assert_eq!(session.title, expected);
            Ok(())
        })?;
    }

    #[test]
    fn prop_delete_only_affects_target(appends in arb_appends(), victim in 0usize..3) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        runtime().block_on(async {
            for (slot, turn) in &appends {
                store.append(&format!("session-{slot}"), turn.clone()).await.unwrap();
            }
            let before = store.list().await.unwrap();

            store.delete(&format!("session-{victim}")).await.unwrap();

            let after = store.list().await.unwrap();
            let expected: Vec<_> = before
                .into_iter()
                .filter(|s| s.session_id != format!("session-{victim}"))
                .collect();
            prop_assert_eq!(after, expected);
            Ok(())
        })?;
    }
}
