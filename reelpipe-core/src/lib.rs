pub mod browser;
pub mod config;
pub mod delivery;
pub mod error;
pub mod pacing;
pub mod post;
pub mod queue;
pub mod retrieval;
pub mod session;

pub use browser::{
    randomized_target, BrowserAutomation, BrowserContext, BrowserError, BrowserFeedSession,
    BrowserLauncher, BrowserResult, DiscoveryConfig, DiscoveryLoop, DiscoveryReport, FeedSession,
    LaunchOverrides, ScanOutcome, SessionAuthenticator, SessionOrigin, StopReason,
};
pub use config::{
    load_pipeline_config, BrowserSection, Credentials, DeliverySection, DiscoverySection,
    LoginSection, PathsSection, PipelineConfig, RetrievalSection, SidecarContent,
};
pub use delivery::{
    DeliveryAttempt, DeliveryConfig, DeliveryError, DeliveryLoop, DeliveryReport, DeliveryResult,
    DeliveryState, MessagingClient, TelegramClient,
};
pub use error::{ConfigError, Result};
pub use pacing::Pacer;
pub use post::PostId;
pub use queue::{DeadLetterLog, QueueError, QueueFile, QueueResult};
pub use retrieval::{
    AbandonedItem, AttemptOutcome, InstagramRetriever, MediaArtifact, MediaRetriever,
    RetrievalConfig, RetrievalError, RetrievalLoop, RetrievalReport, RetrievalResult,
    RetrievedPost, RetryPolicy,
};
pub use session::{SameSite, SessionError, SessionResult, SessionStore, StoredCookie};
