//! Database module - PostgreSQL connection and migrations

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create tables if not exist
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Users (API principals)
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    email VARCHAR(255) NOT NULL UNIQUE,
    password_hash VARCHAR(255) NOT NULL,
    name VARCHAR(255),
    is_active BOOLEAN DEFAULT true,
    last_login TIMESTAMPTZ,
    created_at TIMESTAMPTZ DEFAULT NOW(),
    updated_at TIMESTAMPTZ DEFAULT NOW()
);

-- Scored transactions
CREATE TABLE IF NOT EXISTS transactions (
    id BIGSERIAL PRIMARY KEY,
    time_ind BIGINT NOT NULL,
    time_ref TIMESTAMPTZ,
    transac_type VARCHAR(20) NOT NULL,
    amount DOUBLE PRECISION NOT NULL,
    src_acc VARCHAR(50) NOT NULL,
    src_bal DOUBLE PRECISION NOT NULL,
    src_new_bal DOUBLE PRECISION NOT NULL,
    dst_acc VARCHAR(50),
    dst_bal DOUBLE PRECISION,
    dst_new_bal DOUBLE PRECISION,
    is_fraud BOOLEAN,
    is_flagged_fraud BOOLEAN,
    prediction BOOLEAN NOT NULL,
    raw_features JSONB NOT NULL,
    status BOOLEAN,
    notes TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_transactions_prediction ON transactions(prediction);
CREATE INDEX IF NOT EXISTS idx_transactions_is_fraud ON transactions(is_fraud);
CREATE INDEX IF NOT EXISTS idx_transactions_type ON transactions(transac_type);
"#;
