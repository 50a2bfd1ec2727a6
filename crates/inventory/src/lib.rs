//! Cloud resource enumeration over the ARM REST API.
//!
//! - Paged collection with a hard cap on accumulated results
//! - Provider metadata cache for resolving the latest API version
//! - [`ResourceInventory`] trait so routing can be tested without HTTP

pub mod client;
pub mod error;
pub mod paging;
pub mod provider_cache;
pub mod types;

pub use client::{ResourceInventory, ResourceInventoryClient};
pub use error::InventoryError;
pub use paging::{collect_pages, Page};
pub use provider_cache::{ProviderCache, ProviderMetadata, ProviderResourceType};
