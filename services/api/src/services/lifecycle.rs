//! Parcel status state machine
//!
//! Every status change goes through [`LifecycleEngine`]. Ordinary changes
//! are checked against [`allowed_next`]; blocking and payment updates are
//! separate operations that skip the table. Writes are
//! compare-and-swap on the parcel's `version`, and the engine never retries
//! a lost race.

use std::sync::Arc;

use common::error::DatabaseError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{ServiceError, ServiceResult},
    models::parcel::{Parcel, ParcelChange, ParcelStatus},
    repositories::ParcelStore,
};

/// Actor recorded when an administrative change names nobody
pub const SYSTEM_ACTOR: Uuid = Uuid::nil();

/// Statuses reachable in one step from `from`
pub fn allowed_next(from: ParcelStatus) -> &'static [ParcelStatus] {
    use ParcelStatus::*;

    match from {
        Requested => &[Approved, Cancelled],
        Approved => &[Dispatched, Cancelled],
        Dispatched => &[InTransit, Cancelled],
        InTransit => &[OutForDelivery, Returned],
        OutForDelivery => &[Delivered, Returned],
        Blocked => &[Approved],
        Delivered | Cancelled | Returned => &[],
    }
}

pub fn validate_transition(from: ParcelStatus, to: ParcelStatus) -> ServiceResult<()> {
    if allowed_next(from).contains(&to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidTransition { from, to })
    }
}

#[derive(Clone)]
pub struct LifecycleEngine {
    parcels: Arc<dyn ParcelStore>,
}

impl LifecycleEngine {
    pub fn new(parcels: Arc<dyn ParcelStore>) -> Self {
        Self { parcels }
    }

    async fn load(&self, id: Uuid) -> ServiceResult<Parcel> {
        self.parcels
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Parcel", id))
    }

    /// Persist `change` against the revision `parcel` was read at
    async fn commit(&self, parcel: &Parcel, change: ParcelChange) -> ServiceResult<Parcel> {
        let to = change.status();
        match self
            .parcels
            .apply_change(parcel.id, parcel.version, &change)
            .await
        {
            Ok(Some(updated)) => Ok(updated),
            Ok(None) => Err(ServiceError::not_found("Parcel", parcel.id)),
            Err(DatabaseError::VersionConflict { .. }) => {
                warn!(
                    "Parcel {} changed concurrently while moving {} -> {}",
                    parcel.tracking_id, parcel.status, to
                );
                Err(ServiceError::ConcurrentModification {
                    id: parcel.id,
                    from: parcel.status,
                    to,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn transition(
        &self,
        parcel: Parcel,
        target: ParcelStatus,
        actor: Uuid,
        note: Option<String>,
        location: Option<String>,
    ) -> ServiceResult<Parcel> {
        validate_transition(parcel.status, target)?;

        let mut change = ParcelChange::new(target, actor, note, location);
        if target == ParcelStatus::Delivered {
            change = change.delivered();
        }

        let updated = self.commit(&parcel, change).await?;
        info!(
            "Parcel {} moved {} -> {} by {}",
            updated.tracking_id, parcel.status, target, actor
        );
        Ok(updated)
    }

    /// Move a parcel to `target` if the transition table allows it
    pub async fn update_status(
        &self,
        id: Uuid,
        target: ParcelStatus,
        actor: Uuid,
        note: Option<String>,
        location: Option<String>,
    ) -> ServiceResult<Parcel> {
        self.update_status_authorized(id, target, actor, note, location, |_| Ok(()))
            .await
    }

    /// [`update_status`](Self::update_status) with a caller policy
    ///
    /// `authorize` sees the revision that is committed, so a parcel that
    /// moves after the check fails with `ConcurrentModification`.
    pub async fn update_status_authorized<F>(
        &self,
        id: Uuid,
        target: ParcelStatus,
        actor: Uuid,
        note: Option<String>,
        location: Option<String>,
        authorize: F,
    ) -> ServiceResult<Parcel>
    where
        F: FnOnce(&Parcel) -> ServiceResult<()> + Send,
    {
        let parcel = self.load(id).await?;
        authorize(&parcel)?;
        self.transition(parcel, target, actor, note, location).await
    }

    /// Sender withdraws a parcel that has not left yet
    pub async fn cancel(&self, id: Uuid, requester: Uuid) -> ServiceResult<Parcel> {
        let parcel = self.load(id).await?;
        if parcel.sender != requester {
            return Err(ServiceError::Forbidden(
                "You can only cancel your own parcels".to_string(),
            ));
        }
        if !matches!(
            parcel.status,
            ParcelStatus::Requested | ParcelStatus::Approved
        ) {
            return Err(ServiceError::InvalidState(format!(
                "Parcel cannot be cancelled in {} status",
                parcel.status
            )));
        }

        self.transition(
            parcel,
            ParcelStatus::Cancelled,
            requester,
            Some("Parcel cancelled by sender".to_string()),
            None,
        )
        .await
    }

    /// Receiver acknowledges a parcel that is out for delivery
    pub async fn confirm_delivery(&self, id: Uuid, requester: Uuid) -> ServiceResult<Parcel> {
        let parcel = self.load(id).await?;
        if parcel.receiver != requester {
            return Err(ServiceError::Forbidden(
                "You can only confirm delivery of parcels addressed to you".to_string(),
            ));
        }
        if parcel.status != ParcelStatus::OutForDelivery {
            return Err(ServiceError::InvalidState(format!(
                "Parcel must be {} to confirm delivery, it is {}",
                ParcelStatus::OutForDelivery,
                parcel.status
            )));
        }

        self.transition(
            parcel,
            ParcelStatus::Delivered,
            requester,
            Some("Delivery confirmed by receiver".to_string()),
            None,
        )
        .await
    }

    /// Administrative block or release; skips the transition table
    pub async fn block_unblock(
        &self,
        id: Uuid,
        block: bool,
        reason: Option<String>,
        actor: Option<Uuid>,
    ) -> ServiceResult<Parcel> {
        let parcel = self.load(id).await?;
        let (status, verb) = if block {
            (ParcelStatus::Blocked, "blocked")
        } else {
            (ParcelStatus::Approved, "unblocked")
        };
        let note = reason
            .filter(|reason| !reason.trim().is_empty())
            .unwrap_or_else(|| format!("Parcel {} by admin", verb));

        let change = ParcelChange::new(status, actor.unwrap_or(SYSTEM_ACTOR), Some(note), None)
            .blocked(block);
        let updated = self.commit(&parcel, change).await?;
        info!("Parcel {} {}", updated.tracking_id, verb);
        Ok(updated)
    }

    /// Record payment; the log entry keeps the parcel's current status
    pub async fn update_payment(
        &self,
        id: Uuid,
        is_paid: bool,
        method: Option<String>,
        actor: Option<Uuid>,
    ) -> ServiceResult<Parcel> {
        let parcel = self.load(id).await?;
        let mut note = format!("Payment {}", if is_paid { "completed" } else { "pending" });
        if let Some(method) = &method {
            note.push_str(&format!(" via {}", method));
        }

        let change = ParcelChange::new(
            parcel.status,
            actor.unwrap_or(SYSTEM_ACTOR),
            Some(note),
            None,
        )
        .paid(is_paid, method);
        let updated = self.commit(&parcel, change).await?;
        info!(
            "Parcel {} payment set to {}",
            updated.tracking_id,
            if is_paid { "paid" } else { "unpaid" }
        );
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> ServiceResult<()> {
        let parcel = self.load(id).await?;
        if parcel.status.is_locked_for_deletion() {
            return Err(ServiceError::InvalidState(format!(
                "Cannot delete parcel in {} status",
                parcel.status
            )));
        }

        match self.parcels.delete(id, parcel.version).await {
            Ok(true) => {
                info!("Parcel {} deleted", parcel.tracking_id);
                Ok(())
            }
            Ok(false) => Err(ServiceError::not_found("Parcel", id)),
            Err(DatabaseError::VersionConflict { .. }) => {
                warn!(
                    "Parcel {} changed concurrently while being deleted",
                    parcel.tracking_id
                );
                Err(ServiceError::InvalidState(format!(
                    "Parcel {} changed while it was being deleted; reload and retry",
                    parcel.tracking_id
                )))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        middleware::authorize_status_update,
        models::parcel::{ParcelType, StatusLogEntry},
        repositories::memory::InMemoryParcels,
    };
    use chrono::Utc;
    use common::identity::{Principal, Role};

    /// A parcel sitting in `status`, with a log entry to match
    pub(crate) fn parcel_in(status: ParcelStatus, sender: Uuid, receiver: Uuid) -> Parcel {
        let now = Utc::now();
        Parcel {
            id: Uuid::new_v4(),
            tracking_id: format!("TRK-20260101-{:06}", rand::random::<u32>() % 1_000_000),
            parcel_type: ParcelType::Package,
            weight: 2.0,
            price: 500.0,
            delivery_charge: 90.0,
            total_amount: 590.0,
            sender,
            receiver,
            sender_address: "Mirpur, Dhaka".to_string(),
            receiver_address: "Khulna".to_string(),
            delivery_date: None,
            delivered_at: None,
            status,
            status_logs: vec![StatusLogEntry {
                status,
                timestamp: now,
                updated_by: sender,
                location: None,
                note: None,
            }],
            is_blocked: status == ParcelStatus::Blocked,
            is_paid: false,
            payment_method: None,
            assigned_driver: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    async fn engine_with(parcel: &Parcel) -> (LifecycleEngine, Arc<InMemoryParcels>) {
        let store = Arc::new(InMemoryParcels::new());
        store.insert(parcel).await.unwrap();
        (LifecycleEngine::new(store.clone()), store)
    }

    fn assert_consistent(parcel: &Parcel) {
        assert_eq!(parcel.last_logged_status(), Some(parcel.status));
        assert_eq!(parcel.total_amount, parcel.price + parcel.delivery_charge);
    }

    #[test]
    fn table_matches_the_lifecycle() {
        use ParcelStatus::*;

        let expected = [
            (Requested, vec![Approved, Cancelled]),
            (Approved, vec![Dispatched, Cancelled]),
            (Dispatched, vec![InTransit, Cancelled]),
            (InTransit, vec![OutForDelivery, Returned]),
            (OutForDelivery, vec![Delivered, Returned]),
            (Blocked, vec![Approved]),
            (Delivered, vec![]),
            (Cancelled, vec![]),
            (Returned, vec![]),
        ];
        for (from, next) in expected {
            assert_eq!(allowed_next(from), next.as_slice(), "from {}", from);
        }
    }

    #[test]
    fn terminal_statuses_have_no_way_out() {
        for from in ParcelStatus::ALL.into_iter().filter(ParcelStatus::is_terminal) {
            for to in ParcelStatus::ALL {
                let err = validate_transition(from, to).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::InvalidTransition);
            }
        }
    }

    #[tokio::test]
    async fn every_pair_is_accepted_exactly_when_listed() {
        let admin = Uuid::new_v4();
        for from in ParcelStatus::ALL {
            for to in ParcelStatus::ALL {
                let parcel = parcel_in(from, Uuid::new_v4(), Uuid::new_v4());
                let (engine, _) = engine_with(&parcel).await;

                let result = engine.update_status(parcel.id, to, admin, None, None).await;
                if allowed_next(from).contains(&to) {
                    let updated = result.unwrap();
                    assert_eq!(updated.status, to);
                    assert_eq!(updated.status_logs.len(), 2);
                    assert_eq!(updated.version, 1);
                    assert_consistent(&updated);
                } else {
                    let err = result.unwrap_err();
                    assert_eq!(err.kind(), ErrorKind::InvalidTransition, "{} -> {}", from, to);
                    assert_eq!(
                        err.to_string(),
                        format!("Cannot change status from {} to {}", from, to)
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn delivery_is_stamped_with_the_log_time() {
        let parcel = parcel_in(ParcelStatus::OutForDelivery, Uuid::new_v4(), Uuid::new_v4());
        let (engine, _) = engine_with(&parcel).await;

        let updated = engine
            .update_status(
                parcel.id,
                ParcelStatus::Delivered,
                Uuid::new_v4(),
                Some("Left with the guard".to_string()),
                Some("Khulna".to_string()),
            )
            .await
            .unwrap();

        let entry = updated.status_logs.last().unwrap();
        assert_eq!(updated.delivered_at, Some(entry.timestamp));
        assert_eq!(entry.location.as_deref(), Some("Khulna"));
        assert_eq!(entry.note.as_deref(), Some("Left with the guard"));
    }

    #[tokio::test]
    async fn unknown_parcel_is_not_found() {
        let engine = LifecycleEngine::new(Arc::new(InMemoryParcels::new()));
        let err = engine
            .update_status(Uuid::new_v4(), ParcelStatus::Approved, Uuid::new_v4(), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn sender_cancels_before_dispatch() {
        let sender = Uuid::new_v4();
        for status in [ParcelStatus::Requested, ParcelStatus::Approved] {
            let parcel = parcel_in(status, sender, Uuid::new_v4());
            let (engine, _) = engine_with(&parcel).await;

            let cancelled = engine.cancel(parcel.id, sender).await.unwrap();
            assert_eq!(cancelled.status, ParcelStatus::Cancelled);
            let entry = cancelled.status_logs.last().unwrap();
            assert_eq!(entry.updated_by, sender);
            assert_eq!(entry.note.as_deref(), Some("Parcel cancelled by sender"));
            assert_consistent(&cancelled);
        }
    }

    #[tokio::test]
    async fn cancel_by_someone_else_is_forbidden() {
        let parcel = parcel_in(ParcelStatus::Requested, Uuid::new_v4(), Uuid::new_v4());
        let (engine, store) = engine_with(&parcel).await;

        let err = engine.cancel(parcel.id, parcel.receiver).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(store.snapshot(parcel.id).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn cancel_after_dispatch_is_an_invalid_state() {
        let sender = Uuid::new_v4();
        let parcel = parcel_in(ParcelStatus::Dispatched, sender, Uuid::new_v4());
        let (engine, _) = engine_with(&parcel).await;

        let err = engine.cancel(parcel.id, sender).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn receiver_confirms_delivery() {
        let receiver = Uuid::new_v4();
        let parcel = parcel_in(ParcelStatus::OutForDelivery, Uuid::new_v4(), receiver);
        let (engine, _) = engine_with(&parcel).await;

        let delivered = engine.confirm_delivery(parcel.id, receiver).await.unwrap();
        assert_eq!(delivered.status, ParcelStatus::Delivered);
        assert!(delivered.delivered_at.is_some());
        assert_eq!(
            delivered.status_logs.last().unwrap().note.as_deref(),
            Some("Delivery confirmed by receiver")
        );
        assert_consistent(&delivered);
    }

    #[tokio::test]
    async fn confirm_delivery_rules() {
        let receiver = Uuid::new_v4();

        let in_transit = parcel_in(ParcelStatus::InTransit, Uuid::new_v4(), receiver);
        let (engine, _) = engine_with(&in_transit).await;
        let err = engine.confirm_delivery(in_transit.id, receiver).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let out = parcel_in(ParcelStatus::OutForDelivery, Uuid::new_v4(), receiver);
        let (engine, _) = engine_with(&out).await;
        let err = engine.confirm_delivery(out.id, out.sender).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn block_and_unblock_bypass_the_table() {
        let parcel = parcel_in(ParcelStatus::InTransit, Uuid::new_v4(), Uuid::new_v4());
        let (engine, _) = engine_with(&parcel).await;

        let blocked = engine
            .block_unblock(parcel.id, true, None, None)
            .await
            .unwrap();
        assert_eq!(blocked.status, ParcelStatus::Blocked);
        assert!(blocked.is_blocked);
        let entry = blocked.status_logs.last().unwrap();
        assert_eq!(entry.updated_by, SYSTEM_ACTOR);
        assert_eq!(entry.note.as_deref(), Some("Parcel blocked by admin"));

        let admin = Uuid::new_v4();
        let released = engine
            .block_unblock(parcel.id, false, Some("Address verified".to_string()), Some(admin))
            .await
            .unwrap();
        assert_eq!(released.status, ParcelStatus::Approved);
        assert!(!released.is_blocked);
        let entry = released.status_logs.last().unwrap();
        assert_eq!(entry.updated_by, admin);
        assert_eq!(entry.note.as_deref(), Some("Address verified"));
        assert_eq!(released.version, 2);
        assert_consistent(&released);
    }

    #[tokio::test]
    async fn payment_is_logged_under_the_current_status() {
        let parcel = parcel_in(ParcelStatus::InTransit, Uuid::new_v4(), Uuid::new_v4());
        let (engine, _) = engine_with(&parcel).await;

        let paid = engine
            .update_payment(parcel.id, true, Some("bKash".to_string()), None)
            .await
            .unwrap();
        assert!(paid.is_paid);
        assert_eq!(paid.payment_method.as_deref(), Some("bKash"));
        assert_eq!(paid.status, ParcelStatus::InTransit);
        let entry = paid.status_logs.last().unwrap();
        assert_eq!(entry.status, ParcelStatus::InTransit);
        assert_eq!(entry.note.as_deref(), Some("Payment completed via bKash"));

        let pending = engine
            .update_payment(parcel.id, false, None, None)
            .await
            .unwrap();
        assert_eq!(
            pending.status_logs.last().unwrap().note.as_deref(),
            Some("Payment pending")
        );
        assert_consistent(&pending);
    }

    #[tokio::test]
    async fn parcels_on_the_road_are_never_deleted() {
        for status in ParcelStatus::ALL {
            let parcel = parcel_in(status, Uuid::new_v4(), Uuid::new_v4());
            let (engine, store) = engine_with(&parcel).await;

            let result = engine.delete(parcel.id).await;
            if status.is_locked_for_deletion() {
                assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidState);
                assert!(store.snapshot(parcel.id).await.is_some());
            } else {
                result.unwrap();
                assert!(store.snapshot(parcel.id).await.is_none());
            }
        }
    }

    #[tokio::test]
    async fn concurrent_transitions_have_one_winner() {
        let parcel = parcel_in(ParcelStatus::Requested, Uuid::new_v4(), Uuid::new_v4());
        // both loads complete before either write
        let store = Arc::new(InMemoryParcels::with_write_gate(2));
        store.insert(&parcel).await.unwrap();
        let engine = LifecycleEngine::new(store.clone());
        let admin = Uuid::new_v4();

        let (approve, cancel) = tokio::join!(
            engine.update_status(parcel.id, ParcelStatus::Approved, admin, None, None),
            engine.update_status(parcel.id, ParcelStatus::Cancelled, admin, None, None),
        );

        let (winner, loser) = match (approve, cancel) {
            (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
            (approve, cancel) => panic!("expected one winner, got {:?} and {:?}", approve, cancel),
        };
        assert_eq!(loser.kind(), ErrorKind::InvalidTransition);
        assert!(matches!(loser, ServiceError::ConcurrentModification { .. }));

        let stored = store.snapshot(parcel.id).await.unwrap();
        assert_eq!(stored.status, winner.status);
        assert_eq!(stored.status_logs.len(), 2);
        assert_eq!(stored.version, 1);
        assert_consistent(&stored);
    }

    #[tokio::test]
    async fn delete_racing_a_dispatch_never_removes_a_dispatched_parcel() {
        let parcel = parcel_in(ParcelStatus::Approved, Uuid::new_v4(), Uuid::new_v4());
        let store = Arc::new(InMemoryParcels::with_write_gate(2));
        store.insert(&parcel).await.unwrap();
        let engine = LifecycleEngine::new(store.clone());

        let (deleted, dispatched) = tokio::join!(
            engine.delete(parcel.id),
            engine.update_status(parcel.id, ParcelStatus::Dispatched, Uuid::new_v4(), None, None),
        );

        match (deleted, dispatched) {
            (Err(err), Ok(updated)) => {
                assert_eq!(err.kind(), ErrorKind::InvalidState);
                let stored = store.snapshot(parcel.id).await.unwrap();
                assert_eq!(stored.status, ParcelStatus::Dispatched);
                assert_eq!(stored.version, updated.version);
            }
            (Ok(()), Err(err)) => {
                assert_eq!(err.kind(), ErrorKind::NotFound);
                assert!(store.snapshot(parcel.id).await.is_none());
            }
            (deleted, dispatched) => {
                panic!("expected one winner, got {:?} and {:?}", deleted, dispatched)
            }
        }
    }

    #[tokio::test]
    async fn authorized_update_rejects_before_writing() {
        let sender = Uuid::new_v4();
        let parcel = parcel_in(ParcelStatus::Dispatched, sender, Uuid::new_v4());
        let (engine, store) = engine_with(&parcel).await;
        let as_sender = Principal {
            id: sender,
            role: Role::Sender,
        };

        let err = engine
            .update_status_authorized(
                parcel.id,
                ParcelStatus::Cancelled,
                sender,
                None,
                None,
                |current| authorize_status_update(&as_sender, current, ParcelStatus::Cancelled),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(store.snapshot(parcel.id).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn sender_cancel_cannot_overtake_a_dispatch() {
        let sender = Uuid::new_v4();
        let parcel = parcel_in(ParcelStatus::Approved, sender, Uuid::new_v4());
        let store = Arc::new(InMemoryParcels::with_write_gate(2));
        store.insert(&parcel).await.unwrap();
        let engine = LifecycleEngine::new(store.clone());
        let as_sender = Principal {
            id: sender,
            role: Role::Sender,
        };

        let (cancel, dispatch) = tokio::join!(
            engine.update_status_authorized(
                parcel.id,
                ParcelStatus::Cancelled,
                sender,
                None,
                None,
                |current| authorize_status_update(&as_sender, current, ParcelStatus::Cancelled),
            ),
            engine.update_status(parcel.id, ParcelStatus::Dispatched, Uuid::new_v4(), None, None),
        );

        let (winner, loser) = match (cancel, dispatch) {
            (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
            (cancel, dispatch) => panic!("expected one winner, got {:?} and {:?}", cancel, dispatch),
        };
        assert!(matches!(loser, ServiceError::ConcurrentModification { .. }));

        let stored = store.snapshot(parcel.id).await.unwrap();
        assert_eq!(stored.status, winner.status);
        assert_eq!(stored.version, 1);
        assert_consistent(&stored);
    }
}
