use super::*;
use crate::test_support::{chat, ids, msg, profile};

#[tokio::test]
async fn merge_sorts_by_id_and_reports_only_new_messages() {
    let store = SessionStore::new();
    let added = store
        .merge_messages(ChatId(1), vec![msg(1, 12, 7, 30), msg(1, 10, 7, 10)])
        .await;
    assert_eq!(ids(&added), vec![10, 12]);

    let added = store
        .merge_messages(ChatId(1), vec![msg(1, 11, 8, 20), msg(1, 12, 7, 30)])
        .await;
    assert_eq!(ids(&added), vec![11]);
    assert_eq!(ids(&store.log(ChatId(1)).await), vec![10, 11, 12]);
}

#[tokio::test]
async fn merging_identical_batch_twice_is_idempotent() {
    let store = SessionStore::new();
    let batch = vec![msg(5, 3, 1, 3), msg(5, 1, 1, 1), msg(5, 2, 1, 2)];

    store.merge_messages(ChatId(5), batch.clone()).await;
    let first = store.log(ChatId(5)).await;
    let added = store.merge_messages(ChatId(5), batch).await;

    assert!(added.is_empty());
    assert_eq!(store.log(ChatId(5)).await, first);
}

#[tokio::test]
async fn incoming_copy_replaces_stored_copy_on_collision() {
    let store = SessionStore::new();
    store.merge_messages(ChatId(2), vec![msg(2, 4, 1, 40)]).await;

    let mut edited = msg(2, 4, 1, 40);
    edited.text = "edited".into();
    let added = store.merge_messages(ChatId(2), vec![edited]).await;

    assert!(added.is_empty());
    assert_eq!(store.log(ChatId(2)).await[0].text, "edited");
}

#[tokio::test]
async fn duplicate_ids_inside_one_batch_keep_the_last_copy() {
    let store = SessionStore::new();
    let mut later = msg(3, 9, 1, 90);
    later.text = "second".into();

    let added = store
        .merge_messages(ChatId(3), vec![msg(3, 9, 1, 90), later])
        .await;

    assert_eq!(added.len(), 1);
    assert_eq!(added[0].text, "second");
    assert_eq!(store.log_len(ChatId(3)).await, 1);
}

#[tokio::test]
async fn merge_is_targeted_by_chat_id() {
    let store = SessionStore::new();
    store.set_active_chat(ChatId(1)).await;
    store.merge_messages(ChatId(2), vec![msg(99, 1, 1, 1)]).await;

    assert!(store.log(ChatId(1)).await.is_empty());
    let log = store.log(ChatId(2)).await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].chat_id, ChatId(2));
}

#[tokio::test]
async fn anchor_tracks_oldest_held_message() {
    let store = SessionStore::new();
    assert_eq!(store.pagination_anchor(ChatId(4)).await, None);

    store
        .merge_messages(ChatId(4), vec![msg(4, 21, 1, 1100), msg(4, 20, 1, 1000)])
        .await;
    assert_eq!(store.pagination_anchor(ChatId(4)).await, Some(1000));

    store.merge_messages(ChatId(4), vec![msg(4, 15, 1, 500)]).await;
    assert_eq!(store.pagination_anchor(ChatId(4)).await, Some(500));
}

#[tokio::test]
async fn concurrent_merges_never_lose_or_duplicate_messages() {
    let store = std::sync::Arc::new(SessionStore::new());
    let mut tasks = Vec::new();
    for worker in 0..8i64 {
        let store = std::sync::Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            for step in 0..25i64 {
                let id = (step * 8 + worker) % 100;
                store.merge_messages(ChatId(7), vec![msg(7, id, worker, id)]).await;
            }
        }));
    }
    for task in tasks {
        task.await.expect("merge task");
    }

    let log = store.log(ChatId(7)).await;
    assert_eq!(ids(&log), (0..100).collect::<Vec<_>>());
}

#[tokio::test]
async fn chats_are_replaced_wholesale() {
    let store = SessionStore::new();
    store
        .set_chats(HashMap::from([(ChatId(1), chat(1, "a")), (ChatId(2), chat(2, "b"))]))
        .await;
    store
        .set_chats(HashMap::from([(ChatId(3), chat(3, "c"))]))
        .await;

    let chats = store.chats().await;
    assert_eq!(chats.len(), 1);
    assert!(chats.contains_key(&ChatId(3)));
}

#[tokio::test]
async fn reports_uncached_profiles_sorted_and_distinct() {
    let store = SessionStore::new();
    store.put_profiles(vec![profile(1, "A")]).await;

    let missing = store
        .uncached_profiles([UserId(3), UserId(1), UserId(2), UserId(3)])
        .await;

    assert_eq!(missing, vec![UserId(2), UserId(3)]);
    assert_eq!(store.profile(UserId(1)).await.map(|p| p.display_name()), Some("A".into()));
}

#[tokio::test]
async fn revert_active_chat_only_when_still_pointing_at_expected() {
    let store = SessionStore::new();
    store.set_active_chat(ChatId(1)).await;
    let previous = store.set_active_chat(ChatId(2)).await;
    assert_eq!(previous, Some(ChatId(1)));

    assert!(store.revert_active_chat(ChatId(2), previous).await);
    assert_eq!(store.active_chat().await, Some(ChatId(1)));

    store.set_active_chat(ChatId(3)).await;
    assert!(!store.revert_active_chat(ChatId(2), None).await);
    assert_eq!(store.active_chat().await, Some(ChatId(3)));
}
