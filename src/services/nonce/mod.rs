pub mod memory;
pub mod store;

pub use memory::InMemoryNonceStore;
pub use store::{MarkUsed, NonceRecord, NonceStore};
