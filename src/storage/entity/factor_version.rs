use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only: rows are inserted once and never updated.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "factor_versions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub factor_id: i32,
    pub version: i32,
    pub expression: String,
    #[sea_orm(nullable)]
    pub note: Option<String>,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::factor::Entity",
        from = "Column::FactorId",
        to = "super::factor::Column::Id"
    )]
    Factor,
}

impl Related<super::factor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Factor.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
