//! Admin account bootstrap

use anyhow::Result;
use tracing::{info, warn};

use crate::accounts::AccountService;

/// Create the admin from `ADMIN_EMAIL` / `ADMIN_PASSWORD` if both are set
pub async fn seed_admin(accounts: &AccountService) -> Result<()> {
    let (Ok(email), Ok(password)) = (std::env::var("ADMIN_EMAIL"), std::env::var("ADMIN_PASSWORD"))
    else {
        warn!("ADMIN_EMAIL or ADMIN_PASSWORD not set, skipping admin seed");
        return Ok(());
    };

    if accounts.seed_admin(&email, &password).await? {
        info!("Seeded admin account {}", email);
    } else {
        info!("Admin account {} already exists", email);
    }

    Ok(())
}
