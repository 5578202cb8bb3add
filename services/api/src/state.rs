//! Application state shared across handlers

use std::sync::Arc;

use common::cache::RedisPool;
use sqlx::PgPool;

use crate::{
    middleware::TokenVerifier,
    repositories::{DeliveryChargeRepository, ParcelRepository, UserRepository},
    services::{ChargeCalculator, LifecycleEngine, ParcelService, UserService},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub redis_pool: RedisPool,
    pub token_verifier: TokenVerifier,
    pub parcels: ParcelService,
    pub lifecycle: LifecycleEngine,
    pub charges: ChargeCalculator,
    pub users: UserService,
}

impl AppState {
    /// Wire the Postgres repositories into the domain services
    pub fn new(db_pool: PgPool, redis_pool: RedisPool, token_verifier: TokenVerifier) -> Self {
        let parcel_store = Arc::new(ParcelRepository::new(db_pool.clone()));
        let user_store = Arc::new(UserRepository::new(db_pool.clone()));
        let charges = ChargeCalculator::new(Arc::new(DeliveryChargeRepository::new(
            db_pool.clone(),
        )));

        Self {
            parcels: ParcelService::new(parcel_store.clone(), user_store.clone(), charges.clone()),
            lifecycle: LifecycleEngine::new(parcel_store),
            users: UserService::new(user_store),
            charges,
            db_pool,
            redis_pool,
            token_verifier,
        }
    }
}
