//! Cache tier implementations.
pub mod db;
pub mod memory;
pub mod null;

pub use db::DbStore;
pub use memory::MemoryStore;
pub use null::NullStore;
