pub mod client;
pub mod eligibility;
pub mod error;
pub mod gateway;
pub mod html;
pub mod profile;
pub mod root;
pub mod split;
pub mod stream;
pub mod types;

pub use client::MastodonClient;
pub use error::{GatewayError, Result};
pub use eligibility::should_collect;
pub use gateway::{EventStream, MicroblogGateway};
pub use html::strip_html;
pub use profile::{rebuild_managed_fields, truncate_profile_body};
pub use root::resolve_root_status_id;
pub use split::split_reply;
pub use types::{Account, Notification, ProfileField, Status, TimelineEvent};
