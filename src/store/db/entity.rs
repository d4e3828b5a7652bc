pub mod cache_entry;
pub mod refresh_request;

pub use cache_entry::Entity as CacheEntries;
pub use refresh_request::Entity as RefreshQueue;
pub use refresh_request::Model as RefreshRequest;
