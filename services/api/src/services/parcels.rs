//! Parcel creation, listings, lookups and statistics

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use common::{
    error::DatabaseError,
    query::{ListQuery, Paged, QueryBuilder, QueryParams},
};
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use super::charges::ChargeCalculator;
use crate::{
    error::{ServiceError, ServiceResult},
    models::{
        parcel::{
            CreateParcelRequest, Parcel, ParcelDetails, ParcelPredicate, ParcelStatistics,
            ParcelStatus, SearchFilter, StatusLogEntry,
        },
        user::UserSummary,
    },
    repositories::{ParcelStore, UserDirectory},
};

/// Fields `searchTerm` is matched against in parcel listings
pub const PARCEL_SEARCH_FIELDS: [&str; 3] = ["trackingId", "senderAddress", "receiverAddress"];
/// Most results the admin search returns
pub const SEARCH_LIMIT: u32 = 50;
const TRACKING_ID_ATTEMPTS: usize = 3;

/// `TRK-YYYYMMDD-NNNNNN` with a random six-digit suffix
pub fn generate_tracking_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    format!("TRK-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

#[derive(Clone)]
pub struct ParcelService {
    parcels: Arc<dyn ParcelStore>,
    users: Arc<dyn UserDirectory>,
    charges: ChargeCalculator,
}

impl ParcelService {
    pub fn new(
        parcels: Arc<dyn ParcelStore>,
        users: Arc<dyn UserDirectory>,
        charges: ChargeCalculator,
    ) -> Self {
        Self {
            parcels,
            users,
            charges,
        }
    }

    pub async fn create(&self, payload: CreateParcelRequest, sender: Uuid) -> ServiceResult<Parcel> {
        payload.validate().map_err(ServiceError::Validation)?;

        if self.users.find_summary(payload.receiver).await?.is_none() {
            return Err(ServiceError::Validation("Receiver not found".to_string()));
        }

        let delivery_charge = self
            .charges
            .calculate_fee(&payload.receiver_address, payload.parcel_type, payload.weight)
            .await?;

        let now = Utc::now();
        let mut parcel = Parcel {
            id: Uuid::new_v4(),
            tracking_id: generate_tracking_id(),
            parcel_type: payload.parcel_type,
            weight: payload.weight,
            price: payload.price,
            delivery_charge,
            total_amount: payload.price + delivery_charge,
            sender,
            receiver: payload.receiver,
            sender_address: payload.sender_address.trim().to_string(),
            receiver_address: payload.receiver_address.trim().to_string(),
            delivery_date: payload.delivery_date,
            delivered_at: None,
            status: ParcelStatus::Requested,
            status_logs: vec![StatusLogEntry {
                status: ParcelStatus::Requested,
                timestamp: now,
                updated_by: sender,
                location: None,
                note: Some("Parcel created by sender".to_string()),
            }],
            is_blocked: false,
            is_paid: false,
            payment_method: payload.payment_method,
            assigned_driver: payload.assigned_driver,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let mut attempt = 1;
        loop {
            match self.parcels.insert(&parcel).await {
                Ok(()) => break,
                Err(DatabaseError::UniqueViolation(constraint)) if attempt < TRACKING_ID_ATTEMPTS => {
                    warn!(
                        "Tracking id {} already taken ({}), regenerating",
                        parcel.tracking_id, constraint
                    );
                    parcel.tracking_id = generate_tracking_id();
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(
            "Parcel {} created by {} for {} (charge {})",
            parcel.tracking_id, sender, parcel.receiver, delivery_charge
        );
        Ok(parcel)
    }

    async fn page(
        &self,
        base: ListQuery,
        params: &QueryParams,
    ) -> ServiceResult<Paged<ParcelDetails>> {
        let paged = QueryBuilder::scoped(&*self.parcels, base, params)
            .filter()
            .search(&PARCEL_SEARCH_FIELDS)
            .sort()
            .paginate()
            .execute()
            .await?;

        // each person on the page is looked up once
        let mut people: HashMap<Uuid, Option<UserSummary>> = HashMap::new();
        for parcel in &paged.data {
            for id in [parcel.sender, parcel.receiver] {
                if !people.contains_key(&id) {
                    let summary = self.users.find_summary(id).await?;
                    people.insert(id, summary);
                }
            }
        }

        let data = paged
            .data
            .into_iter()
            .map(|parcel| ParcelDetails {
                sender_info: people.get(&parcel.sender).cloned().flatten(),
                receiver_info: people.get(&parcel.receiver).cloned().flatten(),
                parcel,
            })
            .collect();
        Ok(Paged {
            data,
            meta: paged.meta,
        })
    }

    pub async fn list(&self, params: &QueryParams) -> ServiceResult<Paged<ParcelDetails>> {
        self.page(ListQuery::new(), params).await
    }

    pub async fn list_by_sender(
        &self,
        sender: Uuid,
        params: &QueryParams,
    ) -> ServiceResult<Paged<ParcelDetails>> {
        self.page(ListQuery::new().with_condition("sender", sender.to_string()), params)
            .await
    }

    pub async fn list_by_receiver(
        &self,
        receiver: Uuid,
        params: &QueryParams,
    ) -> ServiceResult<Paged<ParcelDetails>> {
        self.page(
            ListQuery::new().with_condition("receiver", receiver.to_string()),
            params,
        )
        .await
    }

    /// Resolve sender and receiver to user summaries
    pub async fn populate(&self, parcel: Parcel) -> ServiceResult<ParcelDetails> {
        let (sender_info, receiver_info) = tokio::try_join!(
            self.users.find_summary(parcel.sender),
            self.users.find_summary(parcel.receiver),
        )?;
        Ok(ParcelDetails {
            parcel,
            sender_info,
            receiver_info,
        })
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<ParcelDetails> {
        let parcel = self
            .parcels
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Parcel", id))?;
        self.populate(parcel).await
    }

    pub async fn get_by_tracking_id(&self, tracking_id: &str) -> ServiceResult<ParcelDetails> {
        let parcel = self
            .parcels
            .find_by_tracking_id(tracking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Parcel", tracking_id))?;
        self.populate(parcel).await
    }

    pub async fn statistics(&self) -> ServiceResult<ParcelStatistics> {
        let any = ParcelPredicate::any();
        let delivered = ParcelPredicate::with_status(&[ParcelStatus::Delivered]);
        let in_transit = ParcelPredicate::with_status(&[
            ParcelStatus::Dispatched,
            ParcelStatus::InTransit,
            ParcelStatus::OutForDelivery,
        ]);
        let cancelled = ParcelPredicate::with_status(&[ParcelStatus::Cancelled]);
        let pending = ParcelPredicate::with_status(&[ParcelStatus::Requested]);
        let earned = ParcelPredicate::with_status(&[ParcelStatus::Delivered]).paid();

        let (total, delivered, in_transit, cancelled, pending, revenue) = tokio::try_join!(
            self.parcels.count_matching(&any),
            self.parcels.count_matching(&delivered),
            self.parcels.count_matching(&in_transit),
            self.parcels.count_matching(&cancelled),
            self.parcels.count_matching(&pending),
            self.parcels.sum_total_amount(&earned),
        )?;

        Ok(ParcelStatistics {
            total,
            delivered,
            in_transit,
            cancelled,
            pending,
            revenue,
        })
    }

    pub async fn search(&self, filter: &SearchFilter) -> ServiceResult<Vec<Parcel>> {
        Ok(self.parcels.search(filter, SEARCH_LIMIT).await?)
    }
}
