//! Change feed and agent notifications.
//!
//! Every committed state change is published on a [`ChangeFeed`]. UI clients
//! treat an event only as a hint to re-query; the relay task turns events into
//! agent-facing messages and hands them to a [`NotificationRelay`].

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::prelude::Decimal;
use serde::Serialize;
use teloxide::prelude::*;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{ debug, info, warn };
use uuid::Uuid;

use crate::enums::TransactionKind;
use crate::error::{ AppError, Result };
use crate::store::{ LedgerStore, Store };

const FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangeEvent {
    TransactionCreated {
        transaction_id: Uuid,
        agent_id: Uuid,
        kind: TransactionKind,
        amount: Decimal,
    },
    TransactionCompleted {
        transaction_id: Uuid,
        agent_id: Uuid,
        kind: TransactionKind,
        amount: Decimal,
        /// Resolved by the watchdog rather than by the agent.
        automatic: bool,
    },
    TransactionFailed {
        transaction_id: Uuid,
        agent_id: Uuid,
        kind: TransactionKind,
        reason: Option<String>,
    },
    WithdrawalReassigned {
        transaction_id: Uuid,
        from_agent: Uuid,
        to_agent: Uuid,
        amount: Decimal,
    },
    BalanceChanged {
        agent_id: Uuid,
    },
    PayoutRequested {
        request_id: Uuid,
        agent_id: Uuid,
        amount: Decimal,
    },
    PayoutApproved {
        request_id: Uuid,
        agent_id: Uuid,
        net_amount: Decimal,
    },
    PayoutRejected {
        request_id: Uuid,
        agent_id: Uuid,
        reason: String,
    },
    PartialFailure {
        saga_id: Uuid,
        transaction_id: Uuid,
        step: i32,
    },
}

/// Message addressed to one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub agent_id: Uuid,
    pub message: String,
}

impl Notification {
    fn new(agent_id: Uuid, message: String) -> Self {
        Self { agent_id, message }
    }
}

impl ChangeEvent {
    /// Agent-facing messages derived from this event.
    pub fn notifications(&self) -> Vec<Notification> {
        match self {
            ChangeEvent::TransactionCreated { transaction_id, agent_id, kind, amount } =>
                vec![
                    Notification::new(
                        *agent_id,
                        format!("📥 New {} of {} assigned to you\nID: {}", kind, amount, transaction_id)
                    )
                ],
            ChangeEvent::TransactionCompleted {
                transaction_id,
                agent_id,
                kind,
                amount,
                automatic,
            } => {
                let how = if *automatic { "automatically completed" } else { "completed" };
                vec![
                    Notification::new(
                        *agent_id,
                        format!("✅ {} of {} {}\nID: {}", kind, amount, how, transaction_id)
                    )
                ]
            }
            ChangeEvent::TransactionFailed { transaction_id, agent_id, kind, reason } =>
                vec![
                    Notification::new(
                        *agent_id,
                        format!(
                            "❌ {} failed: {}\nID: {}",
                            kind,
                            reason.as_deref().unwrap_or("no reason given"),
                            transaction_id
                        )
                    )
                ],
            ChangeEvent::WithdrawalReassigned { transaction_id, from_agent, to_agent, amount } =>
                vec![
                    Notification::new(
                        *from_agent,
                        format!(
                            "⏱ Withdrawal {} of {} was not handled in time and has been removed from you. A penalty was recorded.",
                            transaction_id,
                            amount
                        )
                    ),
                    Notification::new(
                        *to_agent,
                        format!("📥 Withdrawal of {} reassigned to you\nID: {}", amount, transaction_id)
                    )
                ],
            ChangeEvent::PayoutRequested { request_id, agent_id, amount } =>
                vec![
                    Notification::new(
                        *agent_id,
                        format!("🕓 Payout request of {} submitted\nID: {}", amount, request_id)
                    )
                ],
            ChangeEvent::PayoutApproved { request_id, agent_id, net_amount } =>
                vec![
                    Notification::new(
                        *agent_id,
                        format!("💸 Payout approved, {} sent to you\nID: {}", net_amount, request_id)
                    )
                ],
            ChangeEvent::PayoutRejected { request_id, agent_id, reason } =>
                vec![
                    Notification::new(
                        *agent_id,
                        format!("🚫 Payout rejected: {}\nID: {}", reason, request_id)
                    )
                ],
            ChangeEvent::BalanceChanged { .. } | ChangeEvent::PartialFailure { .. } => Vec::new(),
        }
    }
}

/// Broadcast of committed state changes.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: ChangeEvent) {
        debug!(?event, "publishing change");
        // No subscribers is fine; clients re-query on reconnect.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
pub trait NotificationRelay: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Sends notifications as Telegram messages to the agent's linked chat.
pub struct TelegramRelay {
    bot: Bot,
    store: Arc<dyn Store>,
}

impl TelegramRelay {
    pub fn new(bot: Bot, store: Arc<dyn Store>) -> Self {
        Self { bot, store }
    }
}

#[async_trait]
impl NotificationRelay for TelegramRelay {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let agent = self.store
            .get_agent(notification.agent_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Agent {} not found", notification.agent_id)))?;

        let Some(chat_id) = agent.telegram_chat_id else {
            debug!(agent_id = %agent.id, "agent has no linked chat, skipping notification");
            return Ok(());
        };

        self.bot
            .send_message(ChatId(chat_id), notification.message.clone()).await
            .map_err(|e| AppError::Notification(e.to_string()))?;

        Ok(())
    }
}

/// Writes notifications to the log; used when no bot token is configured.
pub struct LogRelay;

#[async_trait]
impl NotificationRelay for LogRelay {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        info!(agent_id = %notification.agent_id, "notify: {}", notification.message);
        Ok(())
    }
}

/// Forwards every feed event's notifications to `relay` until the feed closes.
pub fn spawn_relay(feed: &ChangeFeed, relay: Arc<dyn NotificationRelay>) -> JoinHandle<()> {
    let mut rx = feed.subscribe();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    for notification in event.notifications() {
                        if let Err(e) = relay.deliver(&notification).await {
                            warn!(agent_id = %notification.agent_id, "notification not delivered: {}", e);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification relay fell behind the change feed");
                }
                Err(RecvError::Closed) => {
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reassignment_notifies_both_agents() {
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        let event = ChangeEvent::WithdrawalReassigned {
            transaction_id: Uuid::new_v4(),
            from_agent: from,
            to_agent: to,
            amount: Decimal::from(100),
        };

        let recipients: Vec<Uuid> = event
            .notifications()
            .into_iter()
            .map(|n| n.agent_id)
            .collect();
        assert_eq!(recipients, vec![from, to]);
    }

    #[test]
    fn test_balance_change_is_feed_only() {
        let event = ChangeEvent::BalanceChanged { agent_id: Uuid::new_v4() };
        assert!(event.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_see_published_events() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();
        let agent_id = Uuid::new_v4();

        feed.publish(ChangeEvent::BalanceChanged { agent_id });

        assert_eq!(rx.recv().await.unwrap(), ChangeEvent::BalanceChanged { agent_id });
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        ChangeFeed::new().publish(ChangeEvent::BalanceChanged { agent_id: Uuid::new_v4() });
    }
}
