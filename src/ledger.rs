//! Guarded balance writes.
//!
//! Balances are never written blindly: every change reads the current value,
//! checks it, and commits through [`LedgerStore::compare_and_swap`]. A lost
//! swap means another writer got there first, so the value is re-read and the
//! change retried up to a bounded number of attempts.

use sea_orm::prelude::Decimal;
use tracing::{ debug, warn };

use crate::error::{ AppError, Result };
use crate::store::{ BalanceRef, LedgerStore };

/// Adds `delta` (possibly negative) to `target` and returns the new balance.
///
/// Fails with `InsufficientFunds` when the result would drop below zero and
/// with `StaleTransition` when the value keeps moving for `max_attempts` tries.
pub async fn apply_delta<S>(
    store: &S,
    target: BalanceRef,
    delta: Decimal,
    max_attempts: u32
) -> Result<Decimal>
    where S: LedgerStore + ?Sized
{
    let attempts = max_attempts.max(1);

    for attempt in 1..=attempts {
        let current = store.read_balance(target).await?;
        let next = current + delta;

        if next < Decimal::ZERO {
            return Err(AppError::insufficient(target.to_string(), -delta, current));
        }

        if store.compare_and_swap(target, current, next).await? {
            debug!(%target, %delta, balance = %next, attempt, "balance updated");
            return Ok(next);
        }

        debug!(%target, attempt, "balance moved underneath, re-reading");
    }

    warn!(%target, attempts, "giving up on contended balance");
    Err(
        AppError::StaleTransition(
            format!("{} kept changing after {} attempts", target, attempts)
        )
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::db::entity::end_user_account;
    use crate::store::{ FaultPoint, MemoryStore };

    async fn user_with(store: &MemoryStore, balance: i64) -> Uuid {
        let now = Utc::now();
        let user = store
            .insert_end_user(end_user_account::Model {
                id: Uuid::new_v4(),
                balance: Decimal::from(balance),
                held_balance: Decimal::ZERO,
                created_at: now,
                updated_at: now,
            }).await
            .unwrap();
        user.id
    }

    #[tokio::test]
    async fn test_apply_delta_credits_and_debits() {
        let store = MemoryStore::new();
        let user = user_with(&store, 100).await;
        let target = BalanceRef::UserBalance(user);

        assert_eq!(apply_delta(&store, target, Decimal::from(25), 3).await.unwrap(), Decimal::from(125));
        assert_eq!(apply_delta(&store, target, Decimal::from(-125), 3).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_apply_delta_refuses_negative_balance() {
        let store = MemoryStore::new();
        let user = user_with(&store, 10).await;
        let target = BalanceRef::UserBalance(user);

        let err = apply_delta(&store, target, Decimal::from(-11), 3).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { .. }));
        assert_eq!(store.read_balance(target).await.unwrap(), Decimal::from(10));
    }

    #[tokio::test]
    async fn test_apply_delta_surfaces_store_failure() {
        let store = MemoryStore::new();
        let user = user_with(&store, 10).await;
        store.fail_next(FaultPoint::UserBalanceWrite, 1);

        let err = apply_delta(&store, BalanceRef::UserBalance(user), Decimal::ONE, 3).await;
        assert!(matches!(err, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn test_concurrent_deltas_are_all_kept() {
        let store = Arc::new(MemoryStore::new());
        let user = user_with(&store, 0).await;
        let target = BalanceRef::UserBalance(user);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(
                tokio::spawn(async move {
                    apply_delta(store.as_ref(), target, Decimal::ONE, 50).await
                })
            );
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.read_balance(target).await.unwrap(), Decimal::from(20));
    }

    #[tokio::test]
    async fn test_concurrent_equal_credits_both_land() {
        let store = Arc::new(MemoryStore::new());
        let user = user_with(&store, 0).await;
        let target = BalanceRef::UserBalance(user);

        let (a, b) = tokio::join!(
            apply_delta(store.as_ref(), target, Decimal::from(100), 5),
            apply_delta(store.as_ref(), target, Decimal::from(100), 5)
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(store.read_balance(target).await.unwrap(), Decimal::from(200));
    }
}
