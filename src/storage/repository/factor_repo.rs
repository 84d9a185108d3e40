use crate::error::{PlatformError, PlatformResult};
use crate::storage::entity::factor::{
    self, ActiveModel as FactorActiveModel, Entity as Factor, Model as FactorModel,
};
use crate::storage::entity::factor_version::{
    self, ActiveModel as FactorVersionActiveModel, Entity as FactorVersion,
    Model as FactorVersionModel,
};
use crate::storage::normalize::{non_blank, normalize_code, normalize_expression, normalize_list};
use crate::storage::now_millis;
use log::info;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Input of a registration. `None` metadata keeps whatever the factor already has.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactorDefinition {
    pub code: String,
    pub expression: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub owner: Option<String>,
    pub tags: Option<Vec<String>>,
    pub description: Option<String>,
    pub note: Option<String>,
}

impl FactorDefinition {
    pub fn new(code: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            expression: expression.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorDto {
    pub code: String,
    pub name: String,
    pub category: Option<String>,
    pub owner: Option<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub active: bool,
    pub latest_version: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<FactorModel> for FactorDto {
    fn from(model: FactorModel) -> Self {
        Self {
            code: model.code,
            name: model.name,
            category: model.category,
            owner: model.owner,
            tags: serde_json::from_str(&model.tags_json).unwrap_or_default(),
            description: model.description,
            active: model.is_active,
            latest_version: model.latest_version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Factor metadata after a registration, including the version just appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredFactor {
    pub code: String,
    pub name: String,
    pub category: Option<String>,
    pub owner: Option<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub version: i32,
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorVersionDto {
    pub version: i32,
    pub expression: String,
    pub note: Option<String>,
    pub created_at: i64,
}

impl From<FactorVersionModel> for FactorVersionDto {
    fn from(model: FactorVersionModel) -> Self {
        Self {
            version: model.version,
            expression: model.expression,
            note: model.note,
            created_at: model.created_at,
        }
    }
}

/// Expression pinned to a concrete version of an active factor.
#[derive(Debug, Clone)]
pub struct ResolvedVersion {
    pub factor: FactorDto,
    pub version: i32,
    pub expression: String,
}

/// One entry of a JSON seed catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntry {
    pub code: String,
    pub expression: String,
    pub name: Option<String>,
    pub category: Option<String>,
}

pub struct FactorRepository;

impl FactorRepository {
    /// Creates the factor at version 1, or merges metadata and appends
    /// `latest_version + 1`. Factor row and version row commit together.
    pub async fn register_factor(
        db: &DatabaseConnection,
        def: FactorDefinition,
    ) -> PlatformResult<RegisteredFactor> {
        let code = normalize_code(&def.code)?;
        let expression = normalize_expression(&def.expression)?;
        let name = non_blank(def.name);
        let category = non_blank(def.category);
        let owner = non_blank(def.owner);
        let description = non_blank(def.description);
        let note = non_blank(def.note);
        let tags_json = match def.tags {
            Some(tags) => Some(serde_json::to_string(&normalize_list(tags))?),
            None => None,
        };

        let now = now_millis();
        let txn = db.begin().await?;

        // Write first so the transaction holds the write lock before reading back.
        let mut bump = Factor::update_many()
            .col_expr(
                factor::Column::LatestVersion,
                Expr::col(factor::Column::LatestVersion).add(1),
            )
            .col_expr(factor::Column::UpdatedAt, Expr::value(now))
            .filter(factor::Column::Code.eq(code.as_str()));
        if let Some(v) = &name {
            bump = bump.col_expr(factor::Column::Name, Expr::value(v.clone()));
        }
        if let Some(v) = &category {
            bump = bump.col_expr(factor::Column::Category, Expr::value(v.clone()));
        }
        if let Some(v) = &owner {
            bump = bump.col_expr(factor::Column::Owner, Expr::value(v.clone()));
        }
        if let Some(v) = &tags_json {
            bump = bump.col_expr(factor::Column::TagsJson, Expr::value(v.clone()));
        }
        if let Some(v) = &description {
            bump = bump.col_expr(factor::Column::Description, Expr::value(v.clone()));
        }
        let bumped = bump.exec(&txn).await?;

        let model = if bumped.rows_affected > 0 {
            Factor::find()
                .filter(factor::Column::Code.eq(code.as_str()))
                .one(&txn)
                .await?
                .ok_or_else(|| PlatformError::not_found(format!("factor {}", code)))?
        } else {
            FactorActiveModel {
                code: Set(code.clone()),
                name: Set(name.unwrap_or_else(|| code.clone())),
                category: Set(category),
                owner: Set(owner),
                tags_json: Set(tags_json.unwrap_or_else(|| "[]".to_string())),
                description: Set(description),
                is_active: Set(true),
                latest_version: Set(1),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        };

        FactorVersionActiveModel {
            factor_id: Set(model.id),
            version: Set(model.latest_version),
            expression: Set(expression.clone()),
            note: Set(note),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        info!("Registered factor {} v{}", model.code, model.latest_version);

        let version = model.latest_version;
        let dto = FactorDto::from(model);
        Ok(RegisteredFactor {
            code: dto.code,
            name: dto.name,
            category: dto.category,
            owner: dto.owner,
            tags: dto.tags,
            description: dto.description,
            version,
            expression,
        })
    }

    /// Active factors ordered by code.
    pub async fn list_factors(db: &DatabaseConnection) -> PlatformResult<Vec<FactorDto>> {
        let models = Factor::find()
            .filter(factor::Column::IsActive.eq(true))
            .order_by_asc(factor::Column::Code)
            .all(db)
            .await?;
        Ok(models.into_iter().map(FactorDto::from).collect())
    }

    pub async fn get_factor(db: &DatabaseConnection, code: &str) -> PlatformResult<FactorDto> {
        Self::find_model(db, code).await.map(FactorDto::from)
    }

    pub async fn versions(
        db: &DatabaseConnection,
        code: &str,
    ) -> PlatformResult<Vec<FactorVersionDto>> {
        let factor = Self::find_model(db, code).await?;
        let rows = FactorVersion::find()
            .filter(factor_version::Column::FactorId.eq(factor.id))
            .order_by_asc(factor_version::Column::Version)
            .all(db)
            .await?;
        Ok(rows.into_iter().map(FactorVersionDto::from).collect())
    }

    /// Resolves `version` (default: latest) of an active factor to its expression.
    pub async fn resolve_version(
        db: &DatabaseConnection,
        code: &str,
        version: Option<i32>,
    ) -> PlatformResult<ResolvedVersion> {
        let code = code.trim();
        let factor = Factor::find()
            .filter(factor::Column::Code.eq(code))
            .filter(factor::Column::IsActive.eq(true))
            .one(db)
            .await?
            .ok_or_else(|| PlatformError::not_found(format!("factor {} not found", code)))?;

        let wanted = version.unwrap_or(factor.latest_version);
        let row = FactorVersion::find()
            .filter(factor_version::Column::FactorId.eq(factor.id))
            .filter(factor_version::Column::Version.eq(wanted))
            .one(db)
            .await?
            .ok_or_else(|| {
                PlatformError::not_found(format!("factor {} version {} not found", code, wanted))
            })?;

        Ok(ResolvedVersion {
            factor: FactorDto::from(factor),
            version: row.version,
            expression: row.expression,
        })
    }

    /// Toggles the active flag; inactive factors are hidden from listing and
    /// reject new jobs but keep their history.
    pub async fn set_active(
        db: &DatabaseConnection,
        code: &str,
        active: bool,
    ) -> PlatformResult<()> {
        let res = Factor::update_many()
            .col_expr(factor::Column::IsActive, Expr::value(active))
            .col_expr(factor::Column::UpdatedAt, Expr::value(now_millis()))
            .filter(factor::Column::Code.eq(code.trim()))
            .exec(db)
            .await?;
        if res.rows_affected == 0 {
            return Err(PlatformError::not_found(format!("factor {} not found", code)));
        }
        info!("Factor {} active={}", code.trim(), active);
        Ok(())
    }

    pub async fn count(db: &DatabaseConnection) -> PlatformResult<u64> {
        Ok(Factor::find().count(db).await?)
    }

    /// Registers every catalog entry, but only while the registry is empty.
    pub async fn seed_from_catalog(db: &DatabaseConnection, path: &Path) -> PlatformResult<usize> {
        if Self::count(db).await? > 0 {
            return Ok(0);
        }
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PlatformError::invalid(format!("cannot read catalog {}: {}", path.display(), e))
        })?;
        let entries: Vec<SeedEntry> = serde_json::from_str(&raw)?;
        let mut registered = 0;
        for entry in entries {
            Self::register_factor(
                db,
                FactorDefinition {
                    code: entry.code,
                    expression: entry.expression,
                    name: entry.name,
                    category: entry.category,
                    ..Default::default()
                },
            )
            .await?;
            registered += 1;
        }
        info!("Seeded {} factors from {}", registered, path.display());
        Ok(registered)
    }

    async fn find_model(db: &DatabaseConnection, code: &str) -> PlatformResult<FactorModel> {
        Factor::find()
            .filter(factor::Column::Code.eq(code.trim()))
            .one(db)
            .await?
            .ok_or_else(|| PlatformError::not_found(format!("factor {} not found", code.trim())))
    }
}
