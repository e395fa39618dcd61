mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use agent_ledger::error::Result;
use agent_ledger::notify::{ spawn_relay, Notification, NotificationRelay };
use agent_ledger::services::withdrawal_service::WithdrawalRequest;
use async_trait::async_trait;
use chrono::{ Duration, Utc };
use common::{ dec, Harness };
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct RecordingRelay {
    delivered: Mutex<Vec<Notification>>,
}

impl RecordingRelay {
    async fn for_agent(&self, agent_id: Uuid) -> Vec<String> {
        self.delivered
            .lock().await
            .iter()
            .filter(|n| n.agent_id == agent_id)
            .map(|n| n.message.clone())
            .collect()
    }

    /// Waits until at least `count` notifications arrived.
    async fn settle(&self, count: usize) {
        for _ in 0..100 {
            if self.delivered.lock().await.len() >= count {
                return;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl NotificationRelay for RecordingRelay {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.delivered.lock().await.push(notification.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_relay_delivers_assignment_and_reassignment_messages() {
    let h = Harness::new();
    let relay = Arc::new(RecordingRelay::default());
    let handle = spawn_relay(&h.engine.feed, relay.clone());

    let slow = h.agent("Awa", "1000", "0").await;
    let next = h.agent("Binta", "1000", "0").await;
    let user = h.user("300").await;

    let tx = h.engine.withdrawals
        .create(WithdrawalRequest {
            reference: "wd-1".to_string(),
            user_id: user.id,
            agent_id: Some(slow.id),
            amount: dec("100"),
            payload: None,
        }).await
        .unwrap();
    h.engine.watchdog().run_once(Utc::now() + Duration::seconds(121)).await.unwrap();

    // created (slow), removed (slow), assigned (next)
    relay.settle(3).await;

    let to_slow = relay.for_agent(slow.id).await;
    assert_eq!(to_slow.len(), 2);
    assert!(to_slow[0].contains(&tx.id.to_string()));
    assert!(to_slow[1].contains("removed from you"));

    let to_next = relay.for_agent(next.id).await;
    assert_eq!(to_next.len(), 1);
    assert!(to_next[0].contains("reassigned to you"));

    handle.abort();
}
