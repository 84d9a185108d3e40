use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "factor_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub factor_code: String,
    pub factor_version: i32,
    // snapshot taken at submission, never re-read from factor_versions
    pub expression: String,
    pub start_date: String,
    pub end_date: String,
    pub freq: String,
    pub instruments_json: String,
    pub status: String, // PENDING/RUNNING/SUCCESS/FAILED
    pub priority: i32,
    #[sea_orm(nullable)]
    pub owner: Option<String>,
    pub tags_json: String,
    #[sea_orm(nullable)]
    pub callback_url: Option<String>,
    pub context_json: String,
    #[sea_orm(nullable)]
    pub metrics_json: Option<String>,
    #[sea_orm(nullable)]
    pub error_message: Option<String>,
    #[sea_orm(nullable)]
    pub result_path: Option<String>,
    #[sea_orm(nullable)]
    pub claim_token: Option<String>,
    #[sea_orm(nullable)]
    pub claimed_by: Option<String>,
    #[sea_orm(nullable)]
    pub claimed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
