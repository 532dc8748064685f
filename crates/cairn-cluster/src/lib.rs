pub mod authkey;
pub mod error;
pub mod heartbeat;
pub mod known_bots;
pub mod registry;
pub mod types;

pub use authkey::compute_auth_key;
pub use error::{ClusterError, Result};
pub use heartbeat::run_heartbeat;
pub use known_bots::get_known_bot_usernames;
pub use registry::get_my_position;
pub use types::{Node, Registry};
