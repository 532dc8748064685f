pub mod error;
pub mod fact_store;
pub mod persist;
pub mod session_store;
pub mod types;

pub use error::{Result, StoreError};
pub use fact_store::FactStore;
pub use session_store::SessionStore;
pub use types::{Conversation, Fact, ImageRef, Message, Role, Session};
