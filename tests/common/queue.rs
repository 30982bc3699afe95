use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use controlplane_store::error::Error;
use controlplane_store::model::{CONTENT_TYPE_JSON, NewMessage};
use controlplane_store::queue::{DequeueOptions, QueueClient};
use serde::{Deserialize, Serialize};

/// Lease the clients under test must be configured with.
pub const LEASE: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct TestPayload {
    pub id: String,
    pub msg: String,
}

fn payload(n: usize) -> NewMessage {
    NewMessage::json(&TestPayload {
        id: n.to_string(),
        msg: format!("hello world {n}"),
    })
    .unwrap()
}

async fn sleep(d: Duration) {
    tokio::time::sleep(d).await;
}

pub async fn rejects_bad_messages(client: Arc<dyn QueueClient>) {
    let err = client.enqueue(NewMessage::from_bytes(Vec::new())).await.unwrap_err();
    assert!(matches!(err, Error::EmptyMessage), "got {err:?}");

    let mut text = NewMessage::from_bytes(b"plain".to_vec());
    text.content_type = "text/plain".to_string();
    let err = client.enqueue(text).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedContentType(_)), "got {err:?}");
}

pub async fn empty_queue_has_nothing(client: Arc<dyn QueueClient>) {
    let err = client.dequeue(&DequeueOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::MessageNotFound), "got {err:?}");
}

pub async fn one_lease_at_a_time(client: Arc<dyn QueueClient>) {
    let id = client.enqueue(payload(0)).await.unwrap();
    assert!(id.starts_with(client.name()));

    let message = client.dequeue(&DequeueOptions::default()).await.unwrap();
    assert_eq!(message.id, id);
    assert_eq!(message.dequeue_count, 1);
    assert_eq!(message.content_type, CONTENT_TYPE_JSON);
    assert!(message.next_visible_at > message.enqueued_at);

    let err = client.dequeue(&DequeueOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::MessageNotFound), "got {err:?}");
}

pub async fn expired_lease_is_redelivered(client: Arc<dyn QueueClient>) {
    let id = client.enqueue(payload(0)).await.unwrap();
    let short = DequeueOptions::with_lease(Duration::from_secs(1));

    let first = client.dequeue(&short).await.unwrap();
    assert_eq!(first.dequeue_count, 1);

    sleep(Duration::from_millis(1500)).await;

    let second = client.dequeue(&short).await.unwrap();
    assert_eq!(second.id, id);
    assert_eq!(second.dequeue_count, 2);
    assert_eq!(second.data, first.data);
}

pub async fn stale_handle_cannot_settle(client: Arc<dyn QueueClient>) {
    client.enqueue(payload(0)).await.unwrap();
    let short = DequeueOptions::with_lease(Duration::from_secs(1));

    let mut stale = client.dequeue(&short).await.unwrap();
    sleep(Duration::from_millis(1500)).await;
    let current = client.dequeue(&DequeueOptions::default()).await.unwrap();
    assert_eq!(current.id, stale.id);

    let err = client.extend_message(&mut stale).await.unwrap_err();
    assert!(matches!(err, Error::InvalidMessage), "got {err:?}");
    let err = client.finish_message(&stale).await.unwrap_err();
    assert!(matches!(err, Error::InvalidMessage), "got {err:?}");

    client.finish_message(&current).await.unwrap();
    empty_queue_has_nothing(client).await;
}

pub async fn extension_slides_from_now(client: Arc<dyn QueueClient>) {
    client.enqueue(payload(0)).await.unwrap();

    // Leased until t=2.
    let mut message = client.dequeue(&DequeueOptions::default()).await.unwrap();
    let original_expiry = message.next_visible_at;

    // At t=1, extend to t=3.
    sleep(Duration::from_secs(1)).await;
    client.extend_message(&mut message).await.unwrap();
    assert!(message.next_visible_at > original_expiry);
    assert_eq!(message.dequeue_count, 1);

    // At t=2.5 the original lease would have lapsed.
    sleep(Duration::from_millis(1500)).await;
    let err = client.dequeue(&DequeueOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::MessageNotFound), "got {err:?}");

    // Still held, so it extends again (to t=4.5).
    client.extend_message(&mut message).await.unwrap();
    sleep(Duration::from_secs(1)).await;
    let err = client.dequeue(&DequeueOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::MessageNotFound), "got {err:?}");

    client.finish_message(&message).await.unwrap();
    empty_queue_has_nothing(client).await;
}

pub async fn expired_lease_cannot_extend_or_finish(client: Arc<dyn QueueClient>) {
    client.enqueue(payload(0)).await.unwrap();
    let mut message = client
        .dequeue(&DequeueOptions::with_lease(Duration::from_secs(1)))
        .await
        .unwrap();

    sleep(Duration::from_millis(1500)).await;

    let err = client.extend_message(&mut message).await.unwrap_err();
    assert!(matches!(err, Error::InvalidMessage), "got {err:?}");
    let err = client.finish_message(&message).await.unwrap_err();
    assert!(matches!(err, Error::InvalidMessage), "got {err:?}");

    // Back in circulation.
    let again = client.dequeue(&DequeueOptions::default()).await.unwrap();
    assert_eq!(again.dequeue_count, 2);
    client.finish_message(&again).await.unwrap();
}

pub async fn finished_message_is_gone(client: Arc<dyn QueueClient>) {
    client.enqueue(payload(0)).await.unwrap();
    let mut message = client.dequeue(&DequeueOptions::default()).await.unwrap();
    client.finish_message(&message).await.unwrap();

    let err = client.finish_message(&message).await.unwrap_err();
    assert!(matches!(err, Error::InvalidMessage), "got {err:?}");
    let err = client.extend_message(&mut message).await.unwrap_err();
    assert!(matches!(err, Error::InvalidMessage), "got {err:?}");
}

pub async fn ten_messages_round_trip(client: Arc<dyn QueueClient>) {
    for n in 0..10 {
        client.enqueue(payload(n)).await.unwrap();
    }

    let mut seen = BTreeSet::new();
    for _ in 0..10 {
        let message = client.dequeue(&DequeueOptions::default()).await.unwrap();
        let body: TestPayload = message.decode().unwrap();
        assert_eq!(body.msg, format!("hello world {}", body.id));
        seen.insert(body.id);
        client.finish_message(&message).await.unwrap();
    }

    let expected: BTreeSet<String> = (0..10).map(|n| n.to_string()).collect();
    assert_eq!(seen, expected);
    empty_queue_has_nothing(client).await;
}

pub async fn concurrent_dequeue_hands_out_one_lease(client: Arc<dyn QueueClient>) {
    client.enqueue(payload(0)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            client.dequeue(&DequeueOptions::default()).await
        }));
    }

    let mut leased = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => leased += 1,
            Err(Error::MessageNotFound) => {}
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!(leased, 1);
}
