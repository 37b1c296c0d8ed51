//! In-memory resource store, quota book and event log.

pub mod quota;
pub mod store;
pub mod watch;

pub use quota::QuotaBook;
pub use store::{Objects, StateStore, registry_key};
pub use watch::EventLog;
