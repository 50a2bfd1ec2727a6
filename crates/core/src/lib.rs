pub mod cadence;
pub mod config;
pub mod credentials;
pub mod error;
pub mod resource;
pub mod rule;

pub use cadence::{format_cadence, parse_cadence};
pub use config::Config;
pub use credentials::{StaticTokenProvider, TokenProvider};
pub use error::*;
pub use resource::{ResourceIdentifier, ResourceType};
pub use rule::AlertRule;
