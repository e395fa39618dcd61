use sea_orm::entity::prelude::*;
use serde::{ Deserialize, Serialize };

/// Persisted step cursor of one multi-record workflow run.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "workflow_sagas")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub transaction_id: Uuid,
    /// Acting agent; for reassignments, the agent being penalised.
    pub agent_id: Uuid,
    pub workflow: String, // "deposit_approval", "deposit_auto_resolve", "withdrawal_approval", "withdrawal_decline", "withdrawal_reassignment"
    /// Last step that committed.
    pub step: i32,
    pub status: String, // "running", "completed", "abandoned", "torn"
    pub error: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
