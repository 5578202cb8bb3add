//! Domain services behind the HTTP handlers

pub mod charges;
pub mod lifecycle;
pub mod parcels;
pub mod users;

pub use charges::ChargeCalculator;
pub use lifecycle::LifecycleEngine;
pub use parcels::ParcelService;
pub use users::UserService;
