//! In-memory stores used by the service tests

use async_trait::async_trait;
use chrono::Utc;
use common::{
    error::{DatabaseError, DatabaseResult},
    identity::UserStatus,
    query::{ListQuery, QuerySource},
};
use std::sync::Arc;
use tokio::sync::{Barrier, RwLock};
use uuid::Uuid;

use super::{ChargeRuleStore, ParcelStore, UserDirectory, UserStore};
use crate::models::{
    delivery_charge::DeliveryChargeRule,
    parcel::{Parcel, ParcelChange, ParcelPredicate, ParcelType, SearchFilter},
    user::{UpdateUserRequest, User, UserSummary},
};

#[derive(Default)]
pub struct InMemoryParcels {
    parcels: RwLock<Vec<Parcel>>,
    write_gate: Option<Arc<Barrier>>,
}

impl InMemoryParcels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write waits until `writers` callers have arrived, so all of
    /// them have read the parcel before any of them writes
    pub fn with_write_gate(writers: usize) -> Self {
        InMemoryParcels {
            parcels: RwLock::default(),
            write_gate: Some(Arc::new(Barrier::new(writers))),
        }
    }

    pub async fn snapshot(&self, id: Uuid) -> Option<Parcel> {
        self.parcels
            .read()
            .await
            .iter()
            .find(|parcel| parcel.id == id)
            .cloned()
    }

    async fn pass_write_gate(&self) {
        if let Some(gate) = &self.write_gate {
            gate.wait().await;
        }
    }
}

fn version_conflict(id: Uuid, expected: i64) -> DatabaseError {
    DatabaseError::VersionConflict {
        entity: "parcel",
        id: id.to_string(),
        expected,
    }
}

/// Same effect as the `UPDATE` in `ParcelRepository::apply_change`
fn apply_to(change: &ParcelChange, parcel: &mut Parcel) {
    parcel.status = change.log.status;
    parcel.status_logs.push(change.log.clone());
    if let Some(blocked) = change.is_blocked {
        parcel.is_blocked = blocked;
    }
    if let Some(payment) = &change.payment {
        parcel.is_paid = payment.is_paid;
        parcel.payment_method = payment.method.clone();
    }
    if let Some(delivered_at) = change.delivered_at {
        parcel.delivered_at = Some(delivered_at);
    }
    parcel.version += 1;
    parcel.updated_at = change.log.timestamp;
}

fn predicate_matches(predicate: &ParcelPredicate, parcel: &Parcel) -> bool {
    (predicate.statuses.is_empty() || predicate.statuses.contains(&parcel.status))
        && predicate.is_paid.is_none_or(|paid| parcel.is_paid == paid)
}

fn search_matches(filter: &SearchFilter, parcel: &Parcel) -> bool {
    let tracking = filter.tracking_id.as_deref().is_none_or(|term| {
        parcel
            .tracking_id
            .to_lowercase()
            .contains(&term.to_lowercase())
    });
    tracking
        && filter.status.is_none_or(|status| parcel.status == status)
        && filter.parcel_type.is_none_or(|kind| parcel.parcel_type == kind)
        && filter.sender.is_none_or(|sender| parcel.sender == sender)
        && filter.receiver.is_none_or(|receiver| parcel.receiver == receiver)
        && filter.date_from.is_none_or(|from| parcel.created_at >= from)
        && filter.date_to.is_none_or(|to| parcel.created_at <= to)
}

#[async_trait]
impl QuerySource for InMemoryParcels {
    type Item = Parcel;

    async fn fetch(&self, query: &ListQuery) -> DatabaseResult<Vec<Parcel>> {
        Ok(query.apply(self.parcels.read().await.as_slice()))
    }

    async fn count(&self, query: &ListQuery) -> DatabaseResult<u64> {
        Ok(query.count(self.parcels.read().await.as_slice()))
    }
}

#[async_trait]
impl ParcelStore for InMemoryParcels {
    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Parcel>> {
        Ok(self.snapshot(id).await)
    }

    async fn find_by_tracking_id(&self, tracking_id: &str) -> DatabaseResult<Option<Parcel>> {
        Ok(self
            .parcels
            .read()
            .await
            .iter()
            .find(|parcel| parcel.tracking_id == tracking_id)
            .cloned())
    }

    async fn insert(&self, parcel: &Parcel) -> DatabaseResult<()> {
        let mut parcels = self.parcels.write().await;
        if parcels
            .iter()
            .any(|existing| existing.tracking_id == parcel.tracking_id)
        {
            return Err(DatabaseError::UniqueViolation(
                "parcels_tracking_id_key".to_string(),
            ));
        }
        parcels.push(parcel.clone());
        Ok(())
    }

    async fn apply_change(
        &self,
        id: Uuid,
        expected_version: i64,
        change: &ParcelChange,
    ) -> DatabaseResult<Option<Parcel>> {
        self.pass_write_gate().await;

        let mut parcels = self.parcels.write().await;
        let Some(parcel) = parcels.iter_mut().find(|parcel| parcel.id == id) else {
            return Ok(None);
        };
        if parcel.version != expected_version {
            return Err(version_conflict(id, expected_version));
        }
        apply_to(change, parcel);
        Ok(Some(parcel.clone()))
    }

    async fn delete(&self, id: Uuid, expected_version: i64) -> DatabaseResult<bool> {
        self.pass_write_gate().await;

        let mut parcels = self.parcels.write().await;
        let Some(position) = parcels.iter().position(|parcel| parcel.id == id) else {
            return Ok(false);
        };
        if parcels[position].version != expected_version {
            return Err(version_conflict(id, expected_version));
        }
        parcels.remove(position);
        Ok(true)
    }

    async fn count_matching(&self, predicate: &ParcelPredicate) -> DatabaseResult<u64> {
        Ok(self
            .parcels
            .read()
            .await
            .iter()
            .filter(|parcel| predicate_matches(predicate, parcel))
            .count() as u64)
    }

    async fn sum_total_amount(&self, predicate: &ParcelPredicate) -> DatabaseResult<f64> {
        Ok(self
            .parcels
            .read()
            .await
            .iter()
            .filter(|parcel| predicate_matches(predicate, parcel))
            .map(|parcel| parcel.total_amount)
            .sum())
    }

    async fn search(&self, filter: &SearchFilter, limit: u32) -> DatabaseResult<Vec<Parcel>> {
        let mut found: Vec<Parcel> = self
            .parcels
            .read()
            .await
            .iter()
            .filter(|parcel| search_matches(filter, parcel))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit as usize);
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryUsers {
    users: RwLock<Vec<User>>,
}

impl InMemoryUsers {
    pub fn new(users: Vec<User>) -> Self {
        InMemoryUsers {
            users: RwLock::new(users),
        }
    }
}

#[async_trait]
impl QuerySource for InMemoryUsers {
    type Item = User;

    async fn fetch(&self, query: &ListQuery) -> DatabaseResult<Vec<User>> {
        Ok(query.apply(self.users.read().await.as_slice()))
    }

    async fn count(&self, query: &ListQuery) -> DatabaseResult<u64> {
        Ok(query.count(self.users.read().await.as_slice()))
    }
}

#[async_trait]
impl UserDirectory for InMemoryUsers {
    async fn find_summary(&self, id: Uuid) -> DatabaseResult<Option<UserSummary>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|user| user.id == id)
            .map(|user| UserSummary {
                id: user.id,
                name: user.name.clone(),
                email: user.email.clone(),
                phone: user.phone.clone(),
            }))
    }
}

#[async_trait]
impl UserStore for InMemoryUsers {
    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|user| user.id == id)
            .cloned())
    }

    async fn update(&self, id: Uuid, patch: &UpdateUserRequest) -> DatabaseResult<Option<User>> {
        let mut users = self.users.write().await;
        let email = patch.email.as_ref().map(|email| email.trim().to_lowercase());
        if let Some(email) = &email {
            if users.iter().any(|user| user.id != id && &user.email == email) {
                return Err(DatabaseError::UniqueViolation("users_email_key".to_string()));
            }
        }

        let Some(user) = users.iter_mut().find(|user| user.id == id) else {
            return Ok(None);
        };
        if let Some(name) = &patch.name {
            user.name = name.trim().to_string();
        }
        if let Some(email) = email {
            user.email = email;
        }
        if let Some(phone) = &patch.phone {
            user.phone = Some(phone.clone());
        }
        if let Some(address) = &patch.address {
            user.address = Some(address.clone());
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(status) = patch.status {
            user.status = status;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_status(&self, id: Uuid, status: UserStatus) -> DatabaseResult<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.iter_mut().find(|user| user.id == id).map(|user| {
            user.status = status;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> DatabaseResult<bool> {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|user| user.id != id);
        Ok(users.len() < before)
    }
}

#[derive(Default)]
pub struct InMemoryChargeRules {
    rules: RwLock<Vec<DeliveryChargeRule>>,
}

impl InMemoryChargeRules {
    pub fn new(rules: Vec<DeliveryChargeRule>) -> Self {
        InMemoryChargeRules {
            rules: RwLock::new(rules),
        }
    }
}

#[async_trait]
impl ChargeRuleStore for InMemoryChargeRules {
    async fn find_rule(
        &self,
        district: &str,
        parcel_type: ParcelType,
    ) -> DatabaseResult<Option<DeliveryChargeRule>> {
        Ok(self
            .rules
            .read()
            .await
            .iter()
            .find(|rule| rule.district == district && rule.parcel_type == parcel_type)
            .cloned())
    }

    async fn upsert_rule(&self, rule: &DeliveryChargeRule) -> DatabaseResult<DeliveryChargeRule> {
        let mut rules = self.rules.write().await;
        rules.retain(|existing| {
            !(existing.district == rule.district && existing.parcel_type == rule.parcel_type)
        });
        rules.push(rule.clone());
        Ok(rule.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::parcel::ParcelStatus, services::lifecycle::tests::parcel_in};

    #[test]
    fn search_matches_tracking_substring_case_insensitively() {
        let mut parcel = parcel_in(ParcelStatus::Requested, Uuid::new_v4(), Uuid::new_v4());
        parcel.tracking_id = "TRK-20260101-123456".to_string();
        let filter = SearchFilter {
            tracking_id: Some("trk-2026".to_string()),
            ..SearchFilter::default()
        };
        assert!(search_matches(&filter, &parcel));

        let later = SearchFilter {
            date_from: Some(parcel.created_at + chrono::Duration::seconds(1)),
            ..filter
        };
        assert!(!search_matches(&later, &parcel));
    }

    #[tokio::test]
    async fn stale_delete_is_a_version_conflict() {
        let parcel = parcel_in(ParcelStatus::Approved, Uuid::new_v4(), Uuid::new_v4());
        let store = InMemoryParcels::new();
        store.insert(&parcel).await.unwrap();

        let change = ParcelChange::new(ParcelStatus::Dispatched, Uuid::new_v4(), None, None);
        store.apply_change(parcel.id, 0, &change).await.unwrap();

        let err = store.delete(parcel.id, 0).await.unwrap_err();
        assert!(matches!(err, DatabaseError::VersionConflict { expected: 0, .. }));
        assert_eq!(
            store.snapshot(parcel.id).await.unwrap().status,
            ParcelStatus::Dispatched
        );

        assert!(store.delete(parcel.id, 1).await.unwrap());
        assert!(!store.delete(parcel.id, 1).await.unwrap());
    }
}
