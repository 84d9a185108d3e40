use crate::storage::entity::{Factor, FactorJob, FactorVersion};
use log::info;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
    Statement,
};
use std::time::Duration;

const INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_factor_versions_unique ON factor_versions(factor_id, version);",
    "CREATE INDEX IF NOT EXISTS idx_factor_jobs_status ON factor_jobs(status, priority, created_at);",
    "CREATE INDEX IF NOT EXISTS idx_factor_jobs_claim_token ON factor_jobs(claim_token);",
];

pub async fn establish_connection(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());
    opt.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(60))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    if db.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
        // WAL lets list queries read while a claim transaction holds the write lock
        db.execute(Statement::from_string(
            sea_orm::DatabaseBackend::Sqlite,
            "PRAGMA journal_mode=WAL;".to_string(),
        ))
        .await?;
    }

    create_schema(&db).await?;
    info!("Database ready at {} (WAL, schema initialized)", redact(db_url));

    Ok(db)
}

async fn create_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, Factor).await?;
    create_table(db, FactorVersion).await?;
    create_table(db, FactorJob).await?;

    let backend = db.get_database_backend();
    for sql in INDEXES {
        db.execute(Statement::from_string(backend, sql.to_string()))
            .await?;
    }
    Ok(())
}

async fn create_table<E>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let stmt = builder.build(schema.create_table_from_entity(entity).if_not_exists());
    db.execute(stmt).await?;
    Ok(())
}

fn redact(db_url: &str) -> &str {
    db_url.split('?').next().unwrap_or(db_url)
}
