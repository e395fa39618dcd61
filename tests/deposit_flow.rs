mod common;

use agent_ledger::enums::{ Resolution, SagaStatus, TransactionStatus };
use agent_ledger::error::AppError;
use agent_ledger::notify::ChangeEvent;
use agent_ledger::services::deposit_service::{ AutoResolution, DepositRequest };
use agent_ledger::services::Outcome;
use agent_ledger::store::{ BalanceRef, FaultPoint, SagaLog };
use chrono::{ Duration, Utc };
use common::{ dec, drain, Harness };
use uuid::Uuid;

fn deposit(reference: &str, user_id: Uuid, agent_id: Uuid, amount: &str) -> DepositRequest {
    DepositRequest {
        reference: reference.to_string(),
        user_id,
        agent_id,
        amount: dec(amount),
        proof_url: Some("https://proofs.example/dep.png".to_string()),
    }
}

#[tokio::test]
async fn test_approve_moves_amount_from_agent_to_user() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "500").await;
    let user = h.user("0").await;

    let tx = h.engine.deposits.create(deposit("dep-1", user.id, agent.id, "200")).await.unwrap();
    let before = h.balance(BalanceRef::UserBalance(user.id)).await +
        h.balance(BalanceRef::AgentPlatform(agent.id)).await;

    let outcome = h.engine.deposits.approve(tx.id, agent.id).await.unwrap();
    let approved = outcome.applied().unwrap();

    assert_eq!(approved.status, TransactionStatus::Completed.as_str());
    assert_eq!(h.balance(BalanceRef::UserBalance(user.id)).await, dec("200"));
    assert_eq!(h.balance(BalanceRef::AgentPlatform(agent.id)).await, dec("300"));

    let after = h.balance(BalanceRef::UserBalance(user.id)).await +
        h.balance(BalanceRef::AgentPlatform(agent.id)).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_approve_rejects_insufficient_platform_balance() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "50").await;
    let user = h.user("0").await;

    let tx = h.engine.deposits.create(deposit("dep-1", user.id, agent.id, "80")).await.unwrap();
    let err = h.engine.deposits.approve(tx.id, agent.id).await.unwrap_err();

    assert!(matches!(err, AppError::InsufficientFunds { .. }));
    assert_eq!(h.engine.deposits.get(tx.id).await.unwrap().status, "pending");
    assert_eq!(h.balance(BalanceRef::UserBalance(user.id)).await, dec("0"));
    assert_eq!(h.balance(BalanceRef::AgentPlatform(agent.id)).await, dec("50"));
}

#[tokio::test]
async fn test_decline_leaves_balances_untouched() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "500").await;
    let user = h.user("10").await;

    let tx = h.engine.deposits.create(deposit("dep-1", user.id, agent.id, "200")).await.unwrap();
    let declined = h.engine.deposits
        .decline(tx.id, agent.id, Some("  ".to_string())).await
        .unwrap()
        .applied()
        .unwrap();

    assert_eq!(declined.status, "failed");
    assert_eq!(declined.rejection_reason.as_deref(), Some("Declined by agent"));
    assert_eq!(h.balance(BalanceRef::UserBalance(user.id)).await, dec("10"));
    assert_eq!(h.balance(BalanceRef::AgentPlatform(agent.id)).await, dec("500"));
}

#[tokio::test]
async fn test_second_approve_is_already_processed() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "500").await;
    let user = h.user("0").await;

    let tx = h.engine.deposits.create(deposit("dep-1", user.id, agent.id, "100")).await.unwrap();
    assert!(h.engine.deposits.approve(tx.id, agent.id).await.unwrap().is_applied());

    match h.engine.deposits.approve(tx.id, agent.id).await.unwrap() {
        Outcome::AlreadyProcessed { id, status } => {
            assert_eq!(id, tx.id);
            assert_eq!(status, "completed");
        }
        other => panic!("expected already processed, got {:?}", other),
    }

    assert_eq!(h.balance(BalanceRef::UserBalance(user.id)).await, dec("100"));
    assert_eq!(h.balance(BalanceRef::AgentPlatform(agent.id)).await, dec("400"));
}

#[tokio::test]
async fn test_concurrent_approvals_settle_once() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "500").await;
    let user = h.user("0").await;
    let tx = h.engine.deposits.create(deposit("dep-1", user.id, agent.id, "100")).await.unwrap();

    let (a, b) = tokio::join!(
        h.engine.deposits.approve(tx.id, agent.id),
        h.engine.deposits.approve(tx.id, agent.id)
    );

    let applied = [a.unwrap(), b.unwrap()]
        .iter()
        .filter(|o| o.is_applied())
        .count();
    assert_eq!(applied, 1);
    assert_eq!(h.balance(BalanceRef::UserBalance(user.id)).await, dec("100"));
    assert_eq!(h.balance(BalanceRef::AgentPlatform(agent.id)).await, dec("400"));
}

#[tokio::test]
async fn test_concurrent_equal_deposits_for_one_user_both_credit() {
    let h = Harness::new();
    let awa = h.agent("Awa", "0", "500").await;
    let binta = h.agent("Binta", "0", "500").await;
    let user = h.user("0").await;
    let first = h.engine.deposits.create(deposit("dep-1", user.id, awa.id, "100")).await.unwrap();
    let second = h.engine.deposits.create(deposit("dep-2", user.id, binta.id, "100")).await.unwrap();

    let (a, b) = tokio::join!(
        h.engine.deposits.approve(first.id, awa.id),
        h.engine.deposits.approve(second.id, binta.id)
    );
    assert!(a.unwrap().is_applied());
    assert!(b.unwrap().is_applied());

    assert_eq!(h.balance(BalanceRef::UserBalance(user.id)).await, dec("200"));
    assert_eq!(h.balance(BalanceRef::AgentPlatform(awa.id)).await, dec("400"));
    assert_eq!(h.balance(BalanceRef::AgentPlatform(binta.id)).await, dec("400"));
}

#[tokio::test]
async fn test_other_agent_cannot_act() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "500").await;
    let intruder = h.agent("Binta", "0", "500").await;
    let user = h.user("0").await;

    let tx = h.engine.deposits.create(deposit("dep-1", user.id, agent.id, "100")).await.unwrap();

    let err = h.engine.deposits.approve(tx.id, intruder.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotAssigned { .. }));

    let err = h.engine.deposits.decline(tx.id, intruder.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::NotAssigned { .. }));
    assert_eq!(h.engine.deposits.get(tx.id).await.unwrap().status, "pending");
}

#[tokio::test]
async fn test_create_is_idempotent_on_reference() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "500").await;
    let user = h.user("0").await;
    let mut rx = h.subscribe();

    let first = h.engine.deposits.create(deposit("dep-1", user.id, agent.id, "100")).await.unwrap();
    let second = h.engine.deposits.create(deposit("dep-1", user.id, agent.id, "999")).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.amount, dec("100"));

    let created = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, ChangeEvent::TransactionCreated { .. }))
        .count();
    assert_eq!(created, 1);
}

#[tokio::test]
async fn test_create_rejects_non_positive_amount() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "500").await;
    let user = h.user("0").await;

    let err = h.engine.deposits.create(deposit("dep-1", user.id, agent.id, "0")).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_create_rejects_sub_cent_amount() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "500").await;
    let user = h.user("0").await;

    let err = h.engine.deposits
        .create(deposit("dep-1", user.id, agent.id, "10.00005")).await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = h.engine.agents.buy_platform_balance(agent.id, dec("0.005")).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
    assert_eq!(h.balance(BalanceRef::AgentPlatform(agent.id)).await, dec("500"));
}

#[tokio::test]
async fn test_auto_resolve_completes_when_agent_can_cover() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "500").await;
    let user = h.user("0").await;
    let tx = h.engine.deposits.create(deposit("dep-1", user.id, agent.id, "150")).await.unwrap();

    let later = Utc::now() + Duration::seconds(181);
    let resolution = h.engine.deposits.auto_resolve(tx.id, later).await.unwrap();
    assert_eq!(resolution, AutoResolution::Completed);

    let tx = h.engine.deposits.get(tx.id).await.unwrap();
    assert_eq!(tx.status, "completed");
    assert_eq!(tx.resolution.as_deref(), Some(Resolution::AutoCompleted.as_str()));
    assert_eq!(h.balance(BalanceRef::UserBalance(user.id)).await, dec("150"));
    assert_eq!(h.balance(BalanceRef::AgentPlatform(agent.id)).await, dec("350"));
}

#[tokio::test]
async fn test_auto_resolve_fails_when_platform_balance_is_short() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "20").await;
    let user = h.user("0").await;
    let tx = h.engine.deposits.create(deposit("dep-1", user.id, agent.id, "150")).await.unwrap();

    let later = Utc::now() + Duration::seconds(181);
    let resolution = h.engine.deposits.auto_resolve(tx.id, later).await.unwrap();
    assert_eq!(resolution, AutoResolution::FailedInsufficientBalance);

    let tx = h.engine.deposits.get(tx.id).await.unwrap();
    assert_eq!(tx.status, "failed");
    assert_eq!(tx.resolution.as_deref(), Some(Resolution::AutoFailedInsufficientBalance.as_str()));
    assert_eq!(h.balance(BalanceRef::UserBalance(user.id)).await, dec("0"));
    assert_eq!(h.balance(BalanceRef::AgentPlatform(agent.id)).await, dec("20"));
}

#[tokio::test]
async fn test_auto_resolve_waits_for_deadline() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "500").await;
    let user = h.user("0").await;
    let tx = h.engine.deposits.create(deposit("dep-1", user.id, agent.id, "150")).await.unwrap();

    let resolution = h.engine.deposits.auto_resolve(tx.id, Utc::now()).await.unwrap();
    assert_eq!(resolution, AutoResolution::NotDue);
    assert_eq!(h.engine.deposits.get(tx.id).await.unwrap().status, "pending");
}

#[tokio::test]
async fn test_torn_deposit_is_reported_and_resumed() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "500").await;
    let user = h.user("0").await;
    let tx = h.engine.deposits.create(deposit("dep-1", user.id, agent.id, "100")).await.unwrap();
    let mut rx = h.subscribe();

    h.store.fail_next(FaultPoint::AgentPlatformWrite, 1);
    let err = h.engine.deposits.approve(tx.id, agent.id).await.unwrap_err();

    let saga_id = match err {
        AppError::PartialFailure { saga_id, transaction_id, .. } => {
            assert_eq!(transaction_id, tx.id);
            saga_id
        }
        other => panic!("expected partial failure, got {:?}", other),
    };

    // Status and user credit are committed, the platform debit is not
    assert_eq!(h.engine.deposits.get(tx.id).await.unwrap().status, "completed");
    assert_eq!(h.balance(BalanceRef::UserBalance(user.id)).await, dec("100"));
    assert_eq!(h.balance(BalanceRef::AgentPlatform(agent.id)).await, dec("500"));
    assert!(
        drain(&mut rx)
            .iter()
            .any(|e| matches!(e, ChangeEvent::PartialFailure { saga_id: s, .. } if *s == saga_id))
    );

    let torn = h.engine.incidents.list().await.unwrap();
    assert_eq!(torn.len(), 1);
    assert_eq!(torn[0].id, saga_id);

    h.engine.incidents.resume(saga_id).await.unwrap();

    assert_eq!(h.balance(BalanceRef::UserBalance(user.id)).await, dec("100"));
    assert_eq!(h.balance(BalanceRef::AgentPlatform(agent.id)).await, dec("400"));

    let saga = h.store.get_saga(saga_id).await.unwrap().unwrap();
    assert_eq!(saga.status, SagaStatus::Completed.as_str());
    assert!(h.engine.incidents.list().await.unwrap().is_empty());
}
