pub mod error;
pub mod noise;
pub mod nodeinfo;
pub mod page;
pub mod validate;

pub use error::{FetchError, Result};
pub use noise::is_noise_url;
pub use nodeinfo::is_fediverse_server;
pub use page::{build_client, fetch_page_content, PageContent};
pub use validate::{is_blacklisted, parse_blacklist, validate_url};
