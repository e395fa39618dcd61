use sea_orm::entity::prelude::*;
use serde::{ Deserialize, Serialize };

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "agents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// Float that covers withdrawal payouts.
    pub available_balance: Decimal,
    /// Float that funds deposits; replenished by purchases and commissions.
    pub platform_balance: Decimal,
    pub is_active: bool,
    pub verification_status: String, // "pending", "verified", "rejected"
    pub online_status: String, // "online", "offline"
    pub penalty_count: i32,
    pub telegram_chat_id: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::payment_rail_account::Entity")]
    PaymentRailAccount,
}

impl Related<super::payment_rail_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentRailAccount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
