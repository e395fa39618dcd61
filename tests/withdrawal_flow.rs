mod common;

use agent_ledger::enums::{ CommissionKind, SagaStatus, TransactionStatus };
use agent_ledger::error::AppError;
use agent_ledger::payload;
use agent_ledger::services::withdrawal_service::{
    WithdrawalRequest,
    STEP_AGENT_CREDITED,
    STEP_STATUS_COMPLETED,
};
use agent_ledger::store::{ BalanceRef, FaultPoint, ProfitLedger, SagaLog };
use chrono::{ Duration, Utc };
use common::{ dec, receipt, Harness };
use uuid::Uuid;

fn withdrawal(
    reference: &str,
    user_id: Uuid,
    agent_id: Option<Uuid>,
    amount: &str,
    method: Option<&str>
) -> WithdrawalRequest {
    WithdrawalRequest {
        reference: reference.to_string(),
        user_id,
        agent_id,
        amount: dec(amount),
        payload: method.map(|m|
            serde_json::json!({
                "payment_method": m,
                "account_name": "Moussa Diop",
                "phone_number": "+221770000000",
            }).to_string()
        ),
    }
}

struct Setup {
    h: Harness,
    agent_id: Uuid,
    user_id: Uuid,
    rail_id: Uuid,
}

/// Agent with 1000 float and a 500 "orange" account; user with 300.
async fn setup() -> Setup {
    let h = Harness::new();
    let agent = h.agent("Awa", "1000", "0").await;
    let rail = h.rail_account(agent.id, "Orange", "500").await;
    let user = h.user("300").await;
    Setup {
        agent_id: agent.id,
        user_id: user.id,
        rail_id: rail.id,
        h,
    }
}

#[tokio::test]
async fn test_create_moves_amount_into_escrow() {
    let s = setup().await;

    let tx = s.h.engine.withdrawals
        .create(withdrawal("wd-1", s.user_id, Some(s.agent_id), "100", Some("orange"))).await
        .unwrap();

    assert_eq!(tx.status, TransactionStatus::Pending.as_str());
    assert_eq!(s.h.balance(BalanceRef::UserBalance(s.user_id)).await, dec("200"));
    assert_eq!(s.h.balance(BalanceRef::UserHeld(s.user_id)).await, dec("100"));
}

#[tokio::test]
async fn test_create_rejects_amount_above_user_balance() {
    let s = setup().await;

    let err = s.h.engine.withdrawals
        .create(withdrawal("wd-1", s.user_id, Some(s.agent_id), "301", None)).await
        .unwrap_err();

    assert!(matches!(err, AppError::InsufficientFunds { .. }));
    assert_eq!(s.h.balance(BalanceRef::UserBalance(s.user_id)).await, dec("300"));
    assert_eq!(s.h.balance(BalanceRef::UserHeld(s.user_id)).await, dec("0"));
}

#[tokio::test]
async fn test_create_rejects_sub_cent_amount_before_escrow() {
    let s = setup().await;

    let err = s.h.engine.withdrawals
        .create(withdrawal("wd-1", s.user_id, Some(s.agent_id), "10.00005", None)).await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidInput(_)));
    assert_eq!(s.h.balance(BalanceRef::UserBalance(s.user_id)).await, dec("300"));
    assert_eq!(s.h.balance(BalanceRef::UserHeld(s.user_id)).await, dec("0"));
}

#[tokio::test]
async fn test_create_assigns_an_eligible_agent() {
    let s = setup().await;

    let tx = s.h.engine.withdrawals
        .create(withdrawal("wd-1", s.user_id, None, "100", None)).await
        .unwrap();

    assert_eq!(tx.agent_id, s.agent_id);
}

#[tokio::test]
async fn test_approve_splits_fees_across_stakeholders() {
    let s = setup().await;
    let tx = s.h.engine.withdrawals
        .create(withdrawal("wd-1", s.user_id, Some(s.agent_id), "100", Some("orange"))).await
        .unwrap();

    let done = s.h.engine.withdrawals
        .approve(tx.id, s.agent_id, receipt()).await
        .unwrap()
        .applied()
        .unwrap();

    assert_eq!(done.status, "completed");
    assert_eq!(done.payment_method.as_deref(), Some("orange"));
    let url = done.receipt_url.unwrap();
    assert!(url.starts_with("memory://receipts/"));
    assert!(url.ends_with(".jpg"));

    assert_eq!(s.h.balance(BalanceRef::RailAccount(s.rail_id)).await, dec("408"));
    assert_eq!(s.h.balance(BalanceRef::AgentAvailable(s.agent_id)).await, dec("900"));
    assert_eq!(s.h.balance(BalanceRef::AgentPlatform(s.agent_id)).await, dec("4"));
    assert_eq!(s.h.balance(BalanceRef::UserBalance(s.user_id)).await, dec("200"));
    assert_eq!(s.h.balance(BalanceRef::UserHeld(s.user_id)).await, dec("0"));

    let mut commissions = s.h.engine.ledger.transaction_commissions(tx.id).await.unwrap();
    commissions.sort_by(|a, b| a.kind.cmp(&b.kind));
    assert_eq!(commissions.len(), 2);
    assert_eq!(commissions[0].kind, CommissionKind::Commission.as_str());
    assert_eq!(commissions[0].amount, dec("2.50"));
    assert_eq!(commissions[1].kind, CommissionKind::TransactionFee.as_str());
    assert_eq!(commissions[1].amount, dec("1.50"));

    let profit = s.h.store.admin_profit_for_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(profit.platform_fee, dec("2"));
    assert_eq!(profit.maintenance_fee, dec("2"));
    assert_eq!(profit.total_amount, dec("4"));

    let summary = s.h.engine.ledger.profit_summary().await.unwrap();
    assert_eq!(summary.total, dec("4"));
}

#[tokio::test]
async fn test_approve_without_matching_account_changes_nothing() {
    let s = setup().await;
    let tx = s.h.engine.withdrawals
        .create(withdrawal("wd-1", s.user_id, Some(s.agent_id), "100", Some("wave"))).await
        .unwrap();

    let err = s.h.engine.withdrawals.approve(tx.id, s.agent_id, receipt()).await.unwrap_err();

    assert!(matches!(err, AppError::PaymentAccountNotFound { .. }));
    assert_eq!(s.h.storage.len().await, 0);
    assert_eq!(s.h.engine.withdrawals.get(tx.id).await.unwrap().status, "pending");
    assert_eq!(s.h.balance(BalanceRef::RailAccount(s.rail_id)).await, dec("500"));
    assert_eq!(s.h.balance(BalanceRef::AgentAvailable(s.agent_id)).await, dec("1000"));
    assert_eq!(s.h.balance(BalanceRef::UserHeld(s.user_id)).await, dec("100"));
}

#[tokio::test]
async fn test_approve_without_method_uses_primary_account() {
    let s = setup().await;
    let tx = s.h.engine.withdrawals
        .create(withdrawal("wd-1", s.user_id, Some(s.agent_id), "100", None)).await
        .unwrap();

    s.h.engine.withdrawals.approve(tx.id, s.agent_id, receipt()).await.unwrap();

    assert_eq!(s.h.balance(BalanceRef::RailAccount(s.rail_id)).await, dec("408"));
}

#[tokio::test]
async fn test_url_encoded_payload_selects_account() {
    let s = setup().await;
    let wave = s.h.rail_account(s.agent_id, "wave", "200").await;

    let mut req = withdrawal("wd-1", s.user_id, Some(s.agent_id), "100", None);
    req.payload = Some(urlencoding::encode(r#"{"payment_method":"Wave"}"#).into_owned());
    let tx = s.h.engine.withdrawals.create(req).await.unwrap();

    s.h.engine.withdrawals.approve(tx.id, s.agent_id, receipt()).await.unwrap();

    assert_eq!(s.h.balance(BalanceRef::RailAccount(wave.id)).await, dec("108"));
    assert_eq!(s.h.balance(BalanceRef::RailAccount(s.rail_id)).await, dec("500"));
}

#[tokio::test]
async fn test_placeholder_method_falls_back_to_primary_account() {
    let s = setup().await;

    let req = withdrawal("wd-1", s.user_id, Some(s.agent_id), "100", Some(payload::UNSPECIFIED));
    let tx = s.h.engine.withdrawals.create(req).await.unwrap();

    let done = s.h.engine.withdrawals.approve(tx.id, s.agent_id, receipt()).await.unwrap();

    assert!(done.is_applied());
    assert_eq!(s.h.balance(BalanceRef::RailAccount(s.rail_id)).await, dec("408"));
}

#[tokio::test]
async fn test_upload_failure_happens_before_any_write() {
    let s = setup().await;
    let tx = s.h.engine.withdrawals
        .create(withdrawal("wd-1", s.user_id, Some(s.agent_id), "100", Some("orange"))).await
        .unwrap();

    s.h.storage.fail_next(1);
    let err = s.h.engine.withdrawals.approve(tx.id, s.agent_id, receipt()).await.unwrap_err();

    assert!(matches!(err, AppError::UploadFailed(_)));
    let tx = s.h.engine.withdrawals.get(tx.id).await.unwrap();
    assert_eq!(tx.status, "pending");
    assert!(tx.receipt_url.is_none());
    assert_eq!(s.h.balance(BalanceRef::RailAccount(s.rail_id)).await, dec("500"));
    assert_eq!(s.h.balance(BalanceRef::AgentAvailable(s.agent_id)).await, dec("1000"));
    assert!(s.h.store.sagas_with_status(SagaStatus::Running).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_approve_rejects_short_available_balance() {
    let h = Harness::new();
    let agent = h.agent("Awa", "50", "0").await;
    h.rail_account(agent.id, "orange", "500").await;
    let user = h.user("300").await;

    let tx = h.engine.withdrawals
        .create(withdrawal("wd-1", user.id, Some(agent.id), "100", Some("orange"))).await
        .unwrap();
    let err = h.engine.withdrawals.approve(tx.id, agent.id, receipt()).await.unwrap_err();

    assert!(matches!(err, AppError::InsufficientFunds { .. }));
    assert_eq!(h.engine.withdrawals.get(tx.id).await.unwrap().status, "pending");
    assert_eq!(h.storage.len().await, 0);
}

#[tokio::test]
async fn test_approve_rejects_short_rail_balance() {
    let h = Harness::new();
    let agent = h.agent("Awa", "1000", "0").await;
    let rail = h.rail_account(agent.id, "orange", "91.99").await;
    let user = h.user("300").await;

    let tx = h.engine.withdrawals
        .create(withdrawal("wd-1", user.id, Some(agent.id), "100", Some("orange"))).await
        .unwrap();
    let err = h.engine.withdrawals.approve(tx.id, agent.id, receipt()).await.unwrap_err();

    assert!(matches!(err, AppError::InsufficientFunds { .. }));
    assert_eq!(h.balance(BalanceRef::RailAccount(rail.id)).await, dec("91.99"));
    assert_eq!(h.balance(BalanceRef::AgentAvailable(agent.id)).await, dec("1000"));
}

#[tokio::test]
async fn test_decline_refunds_escrow() {
    let s = setup().await;
    let tx = s.h.engine.withdrawals
        .create(withdrawal("wd-1", s.user_id, Some(s.agent_id), "100", Some("orange"))).await
        .unwrap();

    let declined = s.h.engine.withdrawals
        .decline(tx.id, s.agent_id, Some("Numéro injoignable".to_string())).await
        .unwrap()
        .applied()
        .unwrap();

    assert_eq!(declined.status, "failed");
    assert_eq!(declined.rejection_reason.as_deref(), Some("Numéro injoignable"));
    assert_eq!(s.h.balance(BalanceRef::UserBalance(s.user_id)).await, dec("300"));
    assert_eq!(s.h.balance(BalanceRef::UserHeld(s.user_id)).await, dec("0"));
    assert_eq!(s.h.balance(BalanceRef::AgentAvailable(s.agent_id)).await, dec("1000"));

    // A decline after the fact is a no-op
    let again = s.h.engine.withdrawals.decline(tx.id, s.agent_id, None).await.unwrap();
    assert!(!again.is_applied());
    assert_eq!(s.h.balance(BalanceRef::UserBalance(s.user_id)).await, dec("300"));
}

#[tokio::test]
async fn test_torn_approval_resumes_from_rail_debit() {
    let s = setup().await;
    let tx = s.h.engine.withdrawals
        .create(withdrawal("wd-1", s.user_id, Some(s.agent_id), "100", Some("orange"))).await
        .unwrap();

    s.h.store.fail_next(FaultPoint::RailAccountWrite, 1);
    let err = s.h.engine.withdrawals.approve(tx.id, s.agent_id, receipt()).await.unwrap_err();

    let saga_id = match err {
        AppError::PartialFailure { saga_id, step, .. } => {
            assert_eq!(step, STEP_STATUS_COMPLETED);
            saga_id
        }
        other => panic!("expected partial failure, got {:?}", other),
    };
    assert_eq!(s.h.engine.withdrawals.get(tx.id).await.unwrap().status, "completed");
    assert_eq!(s.h.balance(BalanceRef::RailAccount(s.rail_id)).await, dec("500"));
    assert_eq!(s.h.balance(BalanceRef::UserHeld(s.user_id)).await, dec("100"));

    s.h.engine.incidents.resume(saga_id).await.unwrap();

    assert_eq!(s.h.balance(BalanceRef::RailAccount(s.rail_id)).await, dec("408"));
    assert_eq!(s.h.balance(BalanceRef::AgentAvailable(s.agent_id)).await, dec("900"));
    assert_eq!(s.h.balance(BalanceRef::AgentPlatform(s.agent_id)).await, dec("4"));
    assert_eq!(s.h.balance(BalanceRef::UserHeld(s.user_id)).await, dec("0"));
}

#[tokio::test]
async fn test_resumed_approval_does_not_duplicate_ledger_entries() {
    let s = setup().await;
    let tx = s.h.engine.withdrawals
        .create(withdrawal("wd-1", s.user_id, Some(s.agent_id), "100", Some("orange"))).await
        .unwrap();

    // Commissions land, the profit entry does not
    s.h.store.fail_next(FaultPoint::AdminProfitInsert, 1);
    let err = s.h.engine.withdrawals.approve(tx.id, s.agent_id, receipt()).await.unwrap_err();

    let saga_id = match err {
        AppError::PartialFailure { saga_id, step, .. } => {
            assert_eq!(step, STEP_AGENT_CREDITED);
            saga_id
        }
        other => panic!("expected partial failure, got {:?}", other),
    };
    assert_eq!(s.h.engine.ledger.transaction_commissions(tx.id).await.unwrap().len(), 2);
    assert!(s.h.store.admin_profit_for_transaction(tx.id).await.unwrap().is_none());

    s.h.engine.incidents.resume(saga_id).await.unwrap();

    assert_eq!(s.h.engine.ledger.transaction_commissions(tx.id).await.unwrap().len(), 2);
    assert!(s.h.store.admin_profit_for_transaction(tx.id).await.unwrap().is_some());
    assert_eq!(s.h.balance(BalanceRef::AgentPlatform(s.agent_id)).await, dec("4"));
    assert_eq!(s.h.balance(BalanceRef::UserHeld(s.user_id)).await, dec("0"));

    // A completed saga cannot be resumed twice
    let err = s.h.engine.incidents.resume(saga_id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_torn_decline_resumes_refund() {
    let s = setup().await;
    let tx = s.h.engine.withdrawals
        .create(withdrawal("wd-1", s.user_id, Some(s.agent_id), "100", None)).await
        .unwrap();

    s.h.store.fail_next(FaultPoint::UserBalanceWrite, 1);
    let err = s.h.engine.withdrawals.decline(tx.id, s.agent_id, None).await.unwrap_err();
    let saga_id = match err {
        AppError::PartialFailure { saga_id, .. } => saga_id,
        other => panic!("expected partial failure, got {:?}", other),
    };
    assert_eq!(s.h.balance(BalanceRef::UserHeld(s.user_id)).await, dec("0"));
    assert_eq!(s.h.balance(BalanceRef::UserBalance(s.user_id)).await, dec("200"));

    s.h.engine.incidents.resume(saga_id).await.unwrap();

    assert_eq!(s.h.balance(BalanceRef::UserBalance(s.user_id)).await, dec("300"));
    assert_eq!(s.h.balance(BalanceRef::UserHeld(s.user_id)).await, dec("0"));
}

#[tokio::test]
async fn test_concurrent_approvals_pay_out_once() {
    let s = setup().await;
    let tx = s.h.engine.withdrawals
        .create(withdrawal("wd-1", s.user_id, Some(s.agent_id), "100", Some("orange"))).await
        .unwrap();

    let (a, b) = tokio::join!(
        s.h.engine.withdrawals.approve(tx.id, s.agent_id, receipt()),
        s.h.engine.withdrawals.approve(tx.id, s.agent_id, receipt())
    );

    let applied = [a.unwrap(), b.unwrap()]
        .iter()
        .filter(|o| o.is_applied())
        .count();
    assert_eq!(applied, 1);
    assert_eq!(s.h.balance(BalanceRef::RailAccount(s.rail_id)).await, dec("408"));
    assert_eq!(s.h.balance(BalanceRef::AgentAvailable(s.agent_id)).await, dec("900"));
    assert_eq!(s.h.engine.ledger.transaction_commissions(tx.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_previous_agent_cannot_approve_after_reassignment() {
    let s = setup().await;
    let other = s.h.agent("Binta", "1000", "0").await;
    s.h.rail_account(other.id, "orange", "500").await;

    let tx = s.h.engine.withdrawals
        .create(withdrawal("wd-1", s.user_id, Some(s.agent_id), "100", Some("orange"))).await
        .unwrap();

    let report = s.h.engine
        .watchdog()
        .run_once(Utc::now() + Duration::seconds(121)).await
        .unwrap();
    assert_eq!(report.withdrawals_reassigned, 1);

    let err = s.h.engine.withdrawals.approve(tx.id, s.agent_id, receipt()).await.unwrap_err();
    assert!(matches!(err, AppError::NotAssigned { .. }));

    let done = s.h.engine.withdrawals.approve(tx.id, other.id, receipt()).await.unwrap();
    assert!(done.is_applied());
    assert_eq!(s.h.balance(BalanceRef::RailAccount(s.rail_id)).await, dec("500"));
    assert_eq!(s.h.balance(BalanceRef::AgentPlatform(other.id)).await, dec("4"));
}
