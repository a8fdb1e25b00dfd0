pub mod catalog;
pub mod engine;
pub mod memory;
pub mod persistence;
pub mod table;

pub use catalog::EntityCatalog;
pub use engine::RecordStore;
pub use memory::InMemoryStorage;
pub use persistence::{SnapshotMetadata, StoreSnapshot};
pub use table::{Table, TableSchema};
