pub mod deliver;
pub mod discover;
pub mod retrieve;

pub use discover::{DiscoverArgs, DiscoveryOutcome};
