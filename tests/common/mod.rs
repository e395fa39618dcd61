#![allow(dead_code)]

use std::sync::Arc;

use agent_ledger::config::EngineSettings;
use agent_ledger::db::entity::{ agent, end_user_account, payment_rail_account };
use agent_ledger::enums::{ OnlineStatus, VerificationStatus };
use agent_ledger::notify::{ ChangeEvent, ChangeFeed };
use agent_ledger::services::agent_service::NewAgent;
use agent_ledger::services::rail_account_service::NewRailAccount;
use agent_ledger::storage::{ MemoryReceiptStorage, Receipt };
use agent_ledger::store::{ AgentStatusPatch, BalanceRef, LedgerStore, MemoryStore };
use agent_ledger::Engine;
use sea_orm::prelude::Decimal;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<MemoryReceiptStorage>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryReceiptStorage::new());
        let engine = Engine::new(store.clone(), storage.clone(), ChangeFeed::new(), settings);
        Self { engine, store, storage }
    }

    /// A verified, online agent with the given floats.
    pub async fn agent(&self, name: &str, available: &str, platform: &str) -> agent::Model {
        let agents = &self.engine.agents;
        let agent = agents
            .register(NewAgent {
                name: name.to_string(),
                telegram_chat_id: None,
                available_balance: dec(available),
            }).await
            .unwrap();

        agents
            .update_status(agent.id, AgentStatusPatch {
                verification_status: Some(VerificationStatus::Verified),
                online_status: Some(OnlineStatus::Online),
                ..Default::default()
            }).await
            .unwrap();

        if dec(platform) > Decimal::ZERO {
            agents.buy_platform_balance(agent.id, dec(platform)).await.unwrap();
        }

        agents.get(agent.id).await.unwrap()
    }

    pub async fn user(&self, balance: &str) -> end_user_account::Model {
        self.engine.users.open(dec(balance)).await.unwrap()
    }

    pub async fn rail_account(
        &self,
        agent_id: Uuid,
        method: &str,
        balance: &str
    ) -> payment_rail_account::Model {
        self.engine.rail_accounts
            .open(agent_id, NewRailAccount {
                payment_method: method.to_string(),
                account_name: "Caisse principale".to_string(),
                account_number: "770000000".to_string(),
                current_balance: dec(balance),
                is_verified: true,
            }).await
            .unwrap()
    }

    pub async fn balance(&self, target: BalanceRef) -> Decimal {
        self.store.read_balance(target).await.unwrap()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.engine.feed.subscribe()
    }
}

pub fn dec(value: &str) -> Decimal {
    value.parse().unwrap()
}

pub fn receipt() -> Receipt {
    Receipt::new(b"receipt-bytes".to_vec(), Some("jpg")).unwrap()
}

/// Events published so far, without waiting.
pub fn drain(rx: &mut broadcast::Receiver<ChangeEvent>) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
