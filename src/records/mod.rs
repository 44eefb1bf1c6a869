//! Records Module
//! Mission: User-owned income and expense records with folded ownership checks

pub mod api;
pub mod models;
pub mod store;

pub use api::RecordsState;
pub use store::RecordStore;
