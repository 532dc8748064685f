pub mod manager;
pub mod types;

pub use manager::{is_verified_peer, FactCollector};
pub use types::{ExtractedFact, FactCollectionConfig, PeerProfile};
