use std::collections::HashMap;
use std::sync::Arc;

use chrono::{ DateTime, Utc };
use sea_orm::prelude::Decimal;
use serde::Serialize;
use tracing::{ error, info };
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::db::entity::agent_withdrawal_request;
use crate::enums::PayoutStatus;
use crate::error::{ AppError, Result };
use crate::fees::{ self, PayoutFees };
use crate::ledger::apply_delta;
use crate::notify::{ ChangeEvent, ChangeFeed };
use crate::services::Outcome;
use crate::storage::{ receipt_key, Receipt, ReceiptStorage };
use crate::store::{ BalanceRef, LedgerStore, PayoutFilter, PayoutPatch, PayoutStore, Store };

/// One line of the payout fee report.
#[derive(Debug, Clone, Serialize)]
pub struct FeeReportRow {
    pub id: Uuid,
    pub amount: Decimal,
    pub platform_fee: Decimal,
    pub maintenance_fee: Decimal,
    pub net_amount: Decimal,
    pub status: String,
    pub date: DateTime<Utc>,
    pub agent: String,
}

/// Agent requests to cash out platform balance, and their administration.
pub struct PayoutService {
    store: Arc<dyn Store>,
    storage: Arc<dyn ReceiptStorage>,
    feed: ChangeFeed,
    settings: EngineSettings,
}

impl PayoutService {
    pub fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn ReceiptStorage>,
        feed: ChangeFeed,
        settings: EngineSettings
    ) -> Self {
        Self {
            store,
            storage,
            feed,
            settings,
        }
    }

    pub async fn get(&self, request_id: Uuid) -> Result<agent_withdrawal_request::Model> {
        self.store
            .get_payout_request(request_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Payout request {} not found", request_id)))
    }

    pub async fn list(&self, filter: PayoutFilter) -> Result<Vec<agent_withdrawal_request::Model>> {
        self.store.query_payout_requests(filter).await
    }

    /// Reserves `amount` of the agent's platform balance and files a pending request.
    pub async fn request(
        &self,
        agent_id: Uuid,
        amount: Decimal
    ) -> Result<agent_withdrawal_request::Model> {
        fees::ensure_amount(amount)?;

        self.store
            .get_agent(agent_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Agent {} not found", agent_id)))?;

        let fees = PayoutFees::compute(amount);
        let platform = BalanceRef::AgentPlatform(agent_id);
        let max_attempts = self.settings.cas_max_attempts;

        apply_delta(self.store.as_ref(), platform, -amount, max_attempts).await?;

        let now = Utc::now();
        let inserted = self.store.insert_payout_request(agent_withdrawal_request::Model {
            id: Uuid::new_v4(),
            agent_id,
            amount,
            platform_fee: fees.platform_fee,
            maintenance_fee: fees.maintenance_fee,
            net_amount: fees.net,
            status: PayoutStatus::Pending.to_string(),
            rejection_reason: None,
            receipt_url: None,
            created_at: now,
            updated_at: now,
        }).await;

        let request = match inserted {
            Ok(request) => request,
            Err(e) => {
                if
                    let Err(refund) = apply_delta(
                        self.store.as_ref(),
                        platform,
                        amount,
                        max_attempts
                    ).await
                {
                    error!(%agent_id, %amount, "INCIDENT: payout reservation not released: {}", refund);
                }
                return Err(e);
            }
        };

        info!(request_id = %request.id, %agent_id, %amount, net = %fees.net, "payout requested");
        self.feed.publish(ChangeEvent::PayoutRequested {
            request_id: request.id,
            agent_id,
            amount,
        });
        self.feed.publish(ChangeEvent::BalanceChanged { agent_id });

        Ok(request)
    }

    /// Administrator confirms the off-platform transfer with a receipt.
    ///
    /// The gross amount was already reserved by the request, so no balance moves.
    pub async fn approve(
        &self,
        request_id: Uuid,
        receipt: Receipt
    ) -> Result<Outcome<agent_withdrawal_request::Model>> {
        let request = self.get(request_id).await?;
        if request.status != PayoutStatus::Pending.as_str() {
            return Ok(processed(&request));
        }

        let key = receipt_key(request.id, &receipt.extension, Utc::now());
        let receipt_url = self.storage.upload(&key, &receipt).await?;

        let patch = PayoutPatch {
            status: Some(PayoutStatus::Approved),
            receipt_url: Some(receipt_url),
            ..Default::default()
        };
        if !self.store.update_payout_request(request_id, PayoutStatus::Pending, patch).await? {
            return Ok(processed(&self.get(request_id).await?));
        }

        info!(%request_id, agent_id = %request.agent_id, net = %request.net_amount, "payout approved");
        self.feed.publish(ChangeEvent::PayoutApproved {
            request_id,
            agent_id: request.agent_id,
            net_amount: request.net_amount,
        });

        Ok(Outcome::Applied(self.get(request_id).await?))
    }

    /// Administrator refuses the request; the reservation returns to the agent.
    pub async fn reject(
        &self,
        request_id: Uuid,
        reason: &str
    ) -> Result<Outcome<agent_withdrawal_request::Model>> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::InvalidInput("A rejection reason is required".to_string()));
        }

        let request = self.get(request_id).await?;
        if request.status != PayoutStatus::Pending.as_str() {
            return Ok(processed(&request));
        }

        let patch = PayoutPatch {
            status: Some(PayoutStatus::Rejected),
            rejection_reason: Some(reason.to_string()),
            ..Default::default()
        };
        if !self.store.update_payout_request(request_id, PayoutStatus::Pending, patch).await? {
            return Ok(processed(&self.get(request_id).await?));
        }

        if
            let Err(e) = apply_delta(
                self.store.as_ref(),
                BalanceRef::AgentPlatform(request.agent_id),
                request.amount,
                self.settings.cas_max_attempts
            ).await
        {
            error!(
                %request_id,
                agent_id = %request.agent_id,
                amount = %request.amount,
                "INCIDENT: payout rejected but reservation not refunded: {}",
                e
            );
            return Err(e);
        }

        info!(%request_id, agent_id = %request.agent_id, "payout rejected, reservation refunded");
        self.feed.publish(ChangeEvent::PayoutRejected {
            request_id,
            agent_id: request.agent_id,
            reason: reason.to_string(),
        });
        self.feed.publish(ChangeEvent::BalanceChanged { agent_id: request.agent_id });

        Ok(Outcome::Applied(self.get(request_id).await?))
    }

    pub async fn fee_report(&self, filter: PayoutFilter) -> Result<Vec<FeeReportRow>> {
        let requests = self.store.query_payout_requests(filter).await?;

        let mut names: HashMap<Uuid, String> = HashMap::new();
        let mut rows = Vec::with_capacity(requests.len());
        for request in requests {
            if !names.contains_key(&request.agent_id) {
                let name = self.store
                    .get_agent(request.agent_id).await?
                    .map(|a| a.name)
                    .unwrap_or_else(|| request.agent_id.to_string());
                names.insert(request.agent_id, name);
            }

            rows.push(FeeReportRow {
                id: request.id,
                amount: request.amount,
                platform_fee: request.platform_fee,
                maintenance_fee: request.maintenance_fee,
                net_amount: request.net_amount,
                agent: names.get(&request.agent_id).cloned().unwrap_or_default(),
                status: request.status,
                date: request.created_at,
            });
        }

        Ok(rows)
    }
}

fn processed<T>(request: &agent_withdrawal_request::Model) -> Outcome<T> {
    Outcome::AlreadyProcessed {
        id: request.id,
        status: request.status.clone(),
    }
}
