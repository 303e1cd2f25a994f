use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use campus_messaging::collab::{
    MemoryDirectory, MemoryRoster, MemorySessions, PushedEvent, SessionRegistry,
};
use campus_messaging::conversations::ConversationIndex;
use campus_messaging::dispatch::{push_events, Dispatcher};
use campus_messaging::error::EngineError;
use campus_messaging::mentions::MentionIndex;
use campus_messaging::models::{ContentKind, ConversationKind, GroupRole, Message, UserIdentity};
use campus_messaging::recall::RecallOutcome;
use campus_messaging::receipts::ReceiptTracker;
use campus_messaging::store::MessageStore;
use campus_messaging::sync::SyncTracker;

struct Harness {
    store: Arc<MessageStore>,
    conversations: Arc<ConversationIndex>,
    receipts: Arc<ReceiptTracker>,
    mentions: Arc<MentionIndex>,
    sync: Arc<SyncTracker>,
    roster: Arc<MemoryRoster>,
    directory: Arc<MemoryDirectory>,
    sessions: Arc<MemorySessions>,
    dispatcher: Dispatcher,
}

fn harness() -> Harness {
    let store = Arc::new(MessageStore::new());
    let conversations = Arc::new(ConversationIndex::new());
    let receipts = Arc::new(ReceiptTracker::new());
    let mentions = Arc::new(MentionIndex::new());
    let sync = Arc::new(SyncTracker::new(store.clone()));
    let roster = Arc::new(MemoryRoster::new());
    let directory = Arc::new(MemoryDirectory::new());
    let sessions = Arc::new(MemorySessions::new());

    let dispatcher = Dispatcher::new(
        store.clone(),
        conversations.clone(),
        receipts.clone(),
        mentions.clone(),
        sync.clone(),
        roster.clone(),
        directory.clone(),
        sessions.clone() as Arc<dyn SessionRegistry>,
    );

    Harness {
        store,
        conversations,
        receipts,
        mentions,
        sync,
        roster,
        directory,
        sessions,
        dispatcher,
    }
}

fn drain(rx: &mut UnboundedReceiver<PushedEvent>) -> Vec<PushedEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

async fn send_text(h: &Harness, sender: Uuid, target: Uuid) -> Message {
    h.dispatcher
        .send_private(sender, target, ContentKind::Text, "hello".into(), None)
        .await
        .unwrap()
}

#[tokio::test]
async fn private_send_reaches_offline_recipient_through_sync() {
    let h = harness();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    h.sync.register(bob, "phone");

    let message = send_text(&h, alice, bob).await;

    // Both sides get a conversation entry pointing at the new message.
    let alice_entry = h
        .conversations
        .get(alice, ConversationKind::Private, bob)
        .unwrap();
    let bob_entry = h
        .conversations
        .get(bob, ConversationKind::Private, alice)
        .unwrap();
    assert_eq!(alice_entry.last_message_id, Some(message.id));
    assert_eq!(bob_entry.last_message_id, Some(message.id));

    // Only the recipient's unread counter moves.
    assert_eq!(alice_entry.unread_count, 0);
    assert_eq!(bob_entry.unread_count, 1);

    // Bob was offline, so delivery happens on reconnect replay; he acks
    // the sequence of the last entry he received.
    let pending = h.sync.pending(bob, "phone", 10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].message.id, message.id);

    h.sync.advance(bob, "phone", pending[0].seq).unwrap();
    assert!(h.sync.pending(bob, "phone", 10).unwrap().is_empty());
}

#[tokio::test]
async fn private_send_pushes_to_recipient_and_echoes_to_sender() {
    let h = harness();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let mut alice_rx = h.sessions.connect(alice);
    let mut bob_rx = h.sessions.connect(bob);

    let message = send_text(&h, alice, bob).await;

    let bob_events = drain(&mut bob_rx);
    assert_eq!(bob_events.len(), 1);
    assert_eq!(bob_events[0].event, push_events::PRIVATE_MESSAGE);
    assert_eq!(bob_events[0].payload["message"]["id"], message.id);

    // Sender echo lets the sender's other devices render the message.
    let alice_events = drain(&mut alice_rx);
    assert_eq!(alice_events.len(), 1);
    assert_eq!(alice_events[0].payload["message"]["id"], message.id);
}

#[tokio::test]
async fn muted_conversation_skips_unread_bump_but_keeps_projection() {
    let h = harness();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    let entry = h.conversations.upsert(bob, ConversationKind::Private, alice);
    h.conversations.set_muted(entry.id, bob, true).unwrap();

    let message = send_text(&h, alice, bob).await;

    let bob_entry = h
        .conversations
        .get(bob, ConversationKind::Private, alice)
        .unwrap();
    assert_eq!(bob_entry.unread_count, 0);
    assert_eq!(bob_entry.last_message_id, Some(message.id));
    // The receipt exists regardless of muting.
    assert_eq!(h.receipts.unread_recipients_of(message.id), vec![bob]);
}

#[tokio::test]
async fn self_send_and_empty_content_are_rejected() {
    let h = harness();
    let alice = Uuid::new_v4();

    let err = h
        .dispatcher
        .send_private(alice, alice, ContentKind::Text, "hi".into(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = h
        .dispatcher
        .send_private(alice, Uuid::new_v4(), ContentKind::Text, "   ".into(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn group_send_requires_membership() {
    let h = harness();
    let group = Uuid::new_v4();
    let outsider = Uuid::new_v4();
    h.roster.add_member(group, Uuid::new_v4(), GroupRole::Owner);

    let err = h
        .dispatcher
        .send_group(outsider, group, ContentKind::Text, "hi".into(), None, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));
}

#[tokio::test]
async fn group_send_fans_out_to_every_member_except_sender_counters() {
    let h = harness();
    let group = Uuid::new_v4();
    let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    h.roster.add_member(group, alice, GroupRole::Owner);
    h.roster.add_member(group, bob, GroupRole::Member);
    h.roster.add_member(group, carol, GroupRole::Member);
    for user in [alice, bob, carol] {
        h.sync.register(user, "phone");
    }

    let message = h
        .dispatcher
        .send_group(alice, group, ContentKind::Text, "hi all".into(), None, &[])
        .await
        .unwrap();

    for user in [bob, carol] {
        let entry = h
            .conversations
            .get(user, ConversationKind::Group, group)
            .unwrap();
        assert_eq!(entry.unread_count, 1);
        assert_eq!(entry.last_message_id, Some(message.id));
    }

    // The sender's own entry tracks the message without an unread bump or
    // a receipt.
    let sender_entry = h
        .conversations
        .get(alice, ConversationKind::Group, group)
        .unwrap();
    assert_eq!(sender_entry.unread_count, 0);
    assert_eq!(sender_entry.last_message_id, Some(message.id));
    let mut unread = h.receipts.unread_recipients_of(message.id);
    unread.sort();
    let mut expected = vec![bob, carol];
    expected.sort();
    assert_eq!(unread, expected);

    // Per-message counts track the receipt rows as they flip.
    h.dispatcher.mark_read(bob, message.id).unwrap();
    assert_eq!(h.receipts.read_count(message.id), 1);
    assert_eq!(h.receipts.unread_count(message.id), 1);

    // Everyone, sender included, sees the message in their sync stream.
    for user in [alice, bob, carol] {
        let pending = h.sync.pending(user, "phone", 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].message.id, message.id);
    }
}

#[tokio::test]
async fn group_send_delivers_via_room_and_directed_push_with_identical_payload() {
    let h = harness();
    let group = Uuid::new_v4();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    h.roster.add_member(group, alice, GroupRole::Owner);
    h.roster.add_member(group, bob, GroupRole::Member);

    let mut bob_rx = h.sessions.connect(bob);
    h.sessions.join_group(group, bob);

    let message = h
        .dispatcher
        .send_group(alice, group, ContentKind::Text, "hi".into(), None, &[])
        .await
        .unwrap();

    // Bob subscribes to the room AND gets the directed push; the payloads
    // are identical so the client can de-duplicate by message id.
    let events = drain(&mut bob_rx);
    let group_events: Vec<_> = events
        .iter()
        .filter(|e| e.event == push_events::GROUP_MESSAGE)
        .collect();
    assert_eq!(group_events.len(), 2);
    assert_eq!(group_events[0].payload, group_events[1].payload);
    assert_eq!(group_events[0].payload["message"]["id"], message.id);
}

#[tokio::test]
async fn mentions_index_only_members_and_notify_with_display_name() {
    let h = harness();
    let group = Uuid::new_v4();
    let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let stranger = Uuid::new_v4();
    h.roster.add_member(group, alice, GroupRole::Owner);
    h.roster.add_member(group, bob, GroupRole::Member);
    h.roster.add_member(group, carol, GroupRole::Member);
    h.directory.add(UserIdentity {
        user_id: alice,
        phone: "13800000001".into(),
        display_name: "Alice".into(),
    });

    let mut carol_rx = h.sessions.connect(carol);

    let message = h
        .dispatcher
        .send_group(
            alice,
            group,
            ContentKind::Text,
            "@carol ping".into(),
            None,
            &[carol, stranger],
        )
        .await
        .unwrap();

    // Non-members in the mention list are dropped.
    assert_eq!(h.mentions.unread_count(carol), 1);
    assert_eq!(h.mentions.unread_count(stranger), 0);
    assert_eq!(h.mentions.unread_count(bob), 0);
    let refs = h.mentions.list(carol, Some(group), 10, 0);
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].message_id, message.id);

    let mention_events: Vec<_> = drain(&mut carol_rx)
        .into_iter()
        .filter(|e| e.event == push_events::MENTION)
        .collect();
    assert_eq!(mention_events.len(), 1);
    assert_eq!(mention_events[0].payload["sender"], "Alice");

    // Acknowledging twice only decrements once.
    h.mentions.acknowledge(carol, message.id);
    h.mentions.acknowledge(carol, message.id);
    assert_eq!(h.mentions.unread_count(carol), 0);
}

#[tokio::test]
async fn private_recall_is_sender_only() {
    let h = harness();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let message = send_text(&h, alice, bob).await;

    let err = h.dispatcher.recall_message(bob, message.id).await.unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    let outcome = h.dispatcher.recall_message(alice, message.id).await.unwrap();
    assert_eq!(outcome, RecallOutcome::Recalled);
    assert!(h.store.get(message.id).unwrap().recalled);
}

#[tokio::test]
async fn group_recall_respects_roles_and_is_idempotent() {
    let h = harness();
    let group = Uuid::new_v4();
    let (owner, admin, member, other) =
        (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    h.roster.add_member(group, owner, GroupRole::Owner);
    h.roster.add_member(group, admin, GroupRole::Admin);
    h.roster.add_member(group, member, GroupRole::Member);
    h.roster.add_member(group, other, GroupRole::Member);

    let message = h
        .dispatcher
        .send_group(member, group, ContentKind::Text, "oops".into(), None, &[])
        .await
        .unwrap();

    // Another regular member can never recall someone else's message.
    let err = h.dispatcher.recall_message(other, message.id).await.unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    // An admin can, regardless of authorship or age.
    let outcome = h.dispatcher.recall_message(admin, message.id).await.unwrap();
    assert_eq!(outcome, RecallOutcome::Recalled);

    // A second recall, even by the original sender, is a silent no-op.
    let outcome = h.dispatcher.recall_message(member, message.id).await.unwrap();
    assert_eq!(outcome, RecallOutcome::AlreadyRecalled);
}

#[tokio::test]
async fn recall_notice_reaches_private_peers() {
    let h = harness();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let message = send_text(&h, alice, bob).await;

    let mut bob_rx = h.sessions.connect(bob);
    h.dispatcher.recall_message(alice, message.id).await.unwrap();

    let events = drain(&mut bob_rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, push_events::MESSAGE_RECALLED);
    assert_eq!(events[0].payload["message_id"], message.id);
    assert_eq!(
        events[0].payload["operator_id"],
        serde_json::json!(alice)
    );
}

#[tokio::test]
async fn recalled_message_still_replays_with_flag_set() {
    let h = harness();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    h.sync.register(bob, "phone");

    let message = send_text(&h, alice, bob).await;
    h.dispatcher.recall_message(alice, message.id).await.unwrap();

    let pending = h.sync.pending(bob, "phone", 10).unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].message.recalled);
}

#[tokio::test]
async fn deleted_message_disappears_from_history_and_replay() {
    let h = harness();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    h.sync.register(bob, "phone");

    let message = send_text(&h, alice, bob).await;

    // Only the sender may delete.
    let err = h.dispatcher.delete_message(bob, message.id).unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    h.dispatcher.delete_message(alice, message.id).unwrap();
    assert!(h.sync.pending(bob, "phone", 10).unwrap().is_empty());
    assert!(h
        .store
        .range(message.scope(), None, 10)
        .is_empty());
}

#[tokio::test]
async fn read_receipt_notifies_sender_exactly_once() {
    let h = harness();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let message = send_text(&h, alice, bob).await;

    let mut alice_rx = h.sessions.connect(alice);

    h.dispatcher.mark_read(bob, message.id).unwrap();
    let events = drain(&mut alice_rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, push_events::READ_RECEIPT);
    assert_eq!(events[0].payload["reader_id"], serde_json::json!(bob));

    // Marking again changes nothing and pushes nothing.
    h.dispatcher.mark_read(bob, message.id).unwrap();
    assert!(drain(&mut alice_rx).is_empty());

    assert_eq!(h.receipts.readers_of(message.id), vec![bob]);
}

#[tokio::test]
async fn soft_deleted_conversation_revives_on_next_message() {
    let h = harness();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    send_text(&h, alice, bob).await;
    let entry = h
        .conversations
        .get(bob, ConversationKind::Private, alice)
        .unwrap();
    assert_eq!(entry.unread_count, 1);

    h.conversations.soft_delete(entry.id, bob).unwrap();
    assert!(h
        .conversations
        .list_for(bob)
        .into_iter()
        .all(|e| e.id != entry.id));

    let second = send_text(&h, alice, bob).await;
    let revived = h
        .conversations
        .get(bob, ConversationKind::Private, alice)
        .unwrap();
    assert_eq!(revived.id, entry.id);
    assert_eq!(revived.unread_count, 1);
    assert_eq!(revived.last_message_id, Some(second.id));
}

#[tokio::test]
async fn dead_session_does_not_stall_delivery() {
    let h = harness();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    let dead_rx = h.sessions.connect(bob);
    drop(dead_rx);
    let mut live_rx = h.sessions.connect(bob);

    let message = send_text(&h, alice, bob).await;

    let events = drain(&mut live_rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["message"]["id"], message.id);
    assert_eq!(h.sessions.live_session_count(bob), 1);
}
