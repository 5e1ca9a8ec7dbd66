// Test-specific lint overrides: property tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Property-based tests for the append-only history union.
//!
//! A history backfill that resolves after live messages have already
//! arrived must merge as a union by message id:
//! 1. Nothing already held is ever lost or overwritten.
//! 2. No message id appears twice.
//! 3. Backfilled messages land in front of everything held, in page order.
//! 4. Live messages keep their relative arrival order.

use proptest::prelude::*;

use parlor::store::{ConversationStore, Linkman};
use parlor_proto::message::{
    LinkmanId, Message, MessageId, MessageKind, SenderInfo, Timestamp,
};
use parlor_proto::snapshot::GroupSummary;

fn message(id: String, content: String, at: u64) -> Message {
    Message {
        id: MessageId::new(id),
        to: LinkmanId::new("room"),
        kind: MessageKind::Text,
        content,
        from: SenderInfo {
            id: parlor_proto::message::UserId::new("peer"),
            username: "peer".into(),
            avatar: String::new(),
            tag: String::new(),
            origin_username: None,
        },
        create_time: Timestamp::from_millis(at),
        loading: false,
    }
}

fn store_with_room() -> ConversationStore {
    let (mut store, _rx) = ConversationStore::new();
    store.upsert_linkman(
        Linkman::from_group(GroupSummary {
            id: LinkmanId::new("room"),
            name: "room".into(),
            avatar: String::new(),
            create_time: Timestamp::from_millis(0),
        }),
        false,
    );
    store
}

/// Scenario: some live messages arrive, a backfill page resolves, then
/// more live messages arrive.
#[derive(Debug, Clone)]
struct UnionScenario {
    /// Live messages applied before the page lands (ids `L0..Ln`).
    pre: Vec<Message>,
    /// Live messages applied after the page lands.
    post: Vec<Message>,
    /// The backfill page: fresh ids `P0..Pm` mixed with duplicates of
    /// `pre` ids carrying stale content.
    page: Vec<Message>,
    /// Ids of the page entries that are fresh, in page order.
    fresh_ids: Vec<String>,
}

fn arb_scenario() -> impl Strategy<Value = UnionScenario> {
    (0usize..12, 0usize..12, 0usize..12).prop_flat_map(|(n_pre, n_post, n_fresh)| {
        // Choose which pre-arrival live ids the page duplicates.
        let overlap = prop::collection::vec(0usize..n_pre.max(1), 0..=n_pre.min(6));
        overlap.prop_flat_map(move |mut overlap_idx| {
            overlap_idx.sort_unstable();
            overlap_idx.dedup();
            if n_pre == 0 {
                overlap_idx.clear();
            }

            let pre: Vec<Message> = (0..n_pre)
                .map(|i| message(format!("L{i}"), format!("live {i}"), 100 + i as u64))
                .collect();
            let post: Vec<Message> = (0..n_post)
                .map(|i| {
                    message(
                        format!("Q{i}"),
                        format!("late live {i}"),
                        200 + i as u64,
                    )
                })
                .collect();

            let mut page: Vec<Message> = (0..n_fresh)
                .map(|i| message(format!("P{i}"), format!("backfill {i}"), i as u64))
                .collect();
            for &i in &overlap_idx {
                page.push(message(format!("L{i}"), "stale copy".to_string(), 100 + i as u64));
            }

            // Page entries arrive in arbitrary server order.
            Just(page).prop_shuffle().prop_map(move |page| {
                let fresh_ids = page
                    .iter()
                    .filter(|m| m.id.as_str().starts_with('P'))
                    .map(|m| m.id.as_str().to_string())
                    .collect();
                UnionScenario {
                    pre: pre.clone(),
                    post: post.clone(),
                    page,
                    fresh_ids,
                }
            })
        })
    })
}

proptest! {
    #[test]
    fn backfill_union_never_loses_or_duplicates(scenario in arb_scenario()) {
        let mut store = store_with_room();
        let room = LinkmanId::new("room");

        for m in &scenario.pre {
            store.append_message(&room, m.clone()).unwrap();
        }
        let added = store.merge_history(&room, scenario.page.clone()).unwrap();
        prop_assert_eq!(added, scenario.fresh_ids.len());
        for m in &scenario.post {
            store.append_message(&room, m.clone()).unwrap();
        }

        let linkman = store.linkman(&room).unwrap();
        let ids: Vec<String> = linkman
            .messages
            .iter()
            .map(|m| m.id.as_str().to_string())
            .collect();

        // 1 + 2: exactly the union, no duplicates.
        prop_assert_eq!(
            ids.len(),
            scenario.pre.len() + scenario.post.len() + scenario.fresh_ids.len()
        );
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), ids.len());

        // 3: fresh page entries sit in front, in page order.
        prop_assert_eq!(&ids[..scenario.fresh_ids.len()], &scenario.fresh_ids[..]);

        // 4: live messages keep arrival order behind them.
        let live_ids: Vec<String> = scenario
            .pre
            .iter()
            .chain(&scenario.post)
            .map(|m| m.id.as_str().to_string())
            .collect();
        prop_assert_eq!(&ids[scenario.fresh_ids.len()..], &live_ids[..]);

        // Live entries won over their stale backfill duplicates.
        for m in &scenario.pre {
            prop_assert_eq!(
                &linkman.messages.get(&m.id).unwrap().content,
                &m.content
            );
        }
    }

    #[test]
    fn merging_the_same_page_twice_is_idempotent(
        n_fresh in 0usize..10,
        n_live in 0usize..10,
    ) {
        let mut store = store_with_room();
        let room = LinkmanId::new("room");

        for i in 0..n_live {
            store
                .append_message(&room, message(format!("L{i}"), format!("live {i}"), i as u64))
                .unwrap();
        }
        let page: Vec<Message> = (0..n_fresh)
            .map(|i| message(format!("P{i}"), format!("backfill {i}"), i as u64))
            .collect();

        let first = store.merge_history(&room, page.clone()).unwrap();
        let second = store.merge_history(&room, page).unwrap();

        prop_assert_eq!(first, n_fresh);
        prop_assert_eq!(second, 0);
        prop_assert_eq!(
            store.linkman(&room).unwrap().messages.len(),
            n_fresh + n_live
        );
    }
}
