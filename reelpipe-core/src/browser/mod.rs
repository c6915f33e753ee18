mod automation;
mod discovery_loop;
mod error;
mod feed;
mod login;

pub use automation::{BrowserAutomation, BrowserContext, BrowserLauncher, LaunchOverrides};
pub use discovery_loop::{
    randomized_target, DiscoveryConfig, DiscoveryLoop, DiscoveryReport, ScanOutcome, StopReason,
};
pub use error::{BrowserError, BrowserResult};
pub use feed::{BrowserFeedSession, FeedSession};
pub use login::{SessionAuthenticator, SessionOrigin};
