pub mod dispatcher;
pub mod handlers;
pub mod types;

pub use dispatcher::Dispatcher;
pub use handlers::{MentionHandler, UpdateHandler};
pub use types::DispatchConfig;
