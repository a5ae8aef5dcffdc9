// Data Engine Module
// Postgres-backed table browsing behind the studio_core::DataEngine seam

pub mod connection_url;
pub mod drivers;
pub mod registry;
pub mod table_data;

#[cfg(test)]
pub(crate) mod testing;

pub use registry::{DatabaseInfo, EngineRegistry};
pub use studio_core::{DataEngine, EngineError, EngineResult};
pub use table_data::fetch_table_data;
