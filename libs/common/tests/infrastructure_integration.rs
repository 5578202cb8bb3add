//! Integration tests for the infrastructure components
//!
//! These tests verify that the PostgreSQL database and Redis cache the
//! services depend on are reachable. They need live servers, so they are
//! ignored by default: `cargo test -- --ignored`.

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool},
};
use sqlx::Row;

#[tokio::test]
#[ignore = "requires running PostgreSQL and Redis"]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;
    assert!(health_check(&pool).await?, "Database health check failed");

    let row = sqlx::query("SELECT COUNT(*) AS parcels FROM parcels")
        .fetch_one(&pool)
        .await?;
    let parcels: i64 = row.get("parcels");
    assert!(parcels >= 0, "parcels table is not readable");

    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;
    assert!(
        redis_pool.health_check().await?,
        "Redis health check failed"
    );

    let token = "integration_test_token";
    redis_pool.revoke_token(token, 10).await?;
    assert!(redis_pool.is_token_revoked(token).await?);

    Ok(())
}
