use sea_orm::entity::prelude::*;
use serde::{ Deserialize, Serialize };

use crate::enums::{ TransactionKind, TransactionStatus };
use crate::error::Result as AppResult;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub kind: String, // "deposit", "withdrawal"
    /// Gross amount.
    pub amount: Decimal,
    pub status: String, // "pending", "completed", "failed"
    #[sea_orm(unique)]
    pub reference: String,
    pub agent_id: Uuid,
    pub user_id: Uuid,
    /// Opaque withdrawal details blob, JSON or URL-encoded JSON.
    pub payload: Option<String>,
    pub payment_method: Option<String>,
    pub proof_url: Option<String>,
    pub receipt_url: Option<String>,
    pub rejection_reason: Option<String>,
    pub resolution: Option<String>,
    pub reassigned_from: Option<Uuid>,
    pub expires_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn kind(&self) -> AppResult<TransactionKind> {
        self.kind.parse()
    }

    pub fn status(&self) -> AppResult<TransactionStatus> {
        self.status.parse()
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending.as_str()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::error::AppError;

    fn row(kind: &str, status: &str) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            amount: Decimal::new(12_000, 2),
            status: status.to_string(),
            reference: "dep-1".to_string(),
            agent_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            payload: None,
            payment_method: None,
            proof_url: None,
            receipt_url: None,
            rejection_reason: None,
            resolution: None,
            reassigned_from: None,
            expires_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_string_columns_parse_into_enums() {
        let tx = row("withdrawal", "pending");
        assert_eq!(tx.kind().unwrap(), TransactionKind::Withdrawal);
        assert_eq!(tx.status().unwrap(), TransactionStatus::Pending);
        assert!(tx.is_pending());

        let broken = row("deposit", "settled");
        assert!(matches!(broken.status(), Err(AppError::InvalidInput(_))));
        assert!(!broken.is_pending());
    }
}
