//! Property tests for message creation and the in-memory store.

use murmur_storage::{MemoryStore, Message, MessageStore};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

proptest! {
    #[test]
    fn valid_messages_get_unique_ids(
        pairs in prop::collection::vec(("[a-z]{1,12}", ".{1,64}"), 1..50)
    ) {
        let mut ids = HashSet::new();
        for (sender, content) in &pairs {
            let msg = Message::new(sender.as_str(), content.as_str()).unwrap();
            prop_assert!(!msg.id.is_empty());
            prop_assert_eq!(&msg.sender, sender);
            prop_assert_eq!(&msg.content, content);
            prop_assert!(ids.insert(msg.id));
        }
    }

    #[test]
    fn empty_fields_are_rejected(text in ".{0,32}") {
        prop_assert!(Message::new("", text.as_str()).is_err());
        prop_assert!(Message::new(text.as_str(), "").is_err());
    }

    #[test]
    fn memory_store_lists_every_save_in_order(count in 0usize..40) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = MemoryStore::new();
            let mut saved = Vec::new();
            for i in 0..count {
                let msg = Message::new("alice", format!("message {i}")).unwrap();
                store.save(&msg).await.unwrap();
                saved.push(msg);
            }

            let listed = store.list().await.unwrap();
            assert_eq!(listed, saved);
            assert!(listed.windows(2).all(|w| w[0].created_at < w[1].created_at));
        });
    }
}

#[test]
fn memory_store_lists_concurrent_saves_in_order() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(8)
        .build()
        .unwrap();

    runtime.block_on(async {
        let store = Arc::new(MemoryStore::new());

        let writers: Vec<_> = (0..8)
            .map(|w| {
                let store = store.clone();
                tokio::spawn(async move {
                    for i in 0..5_000 {
                        let msg = Message::new(format!("writer-{w}"), format!("m{i}")).unwrap();
                        store.save(&msg).await.unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 40_000);
        assert!(listed.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    });
}
