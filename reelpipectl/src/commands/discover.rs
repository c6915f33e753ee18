use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

use reelpipe_core::browser::{
    randomized_target, BrowserAutomation, BrowserFeedSession, BrowserLauncher, DiscoveryConfig,
    DiscoveryLoop, DiscoveryReport, LaunchOverrides, SessionAuthenticator, SessionOrigin,
};

use crate::{AppContext, Result};

/// Runs one discovery pass over the reels feed.
#[derive(Args, Debug, Clone)]
pub struct DiscoverArgs {
    /// Base number of posts to collect (REELS_TO_COLLECT, then discovery.target_count otherwise)
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub headful: bool,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryOutcome {
    pub session: SessionOrigin,
    pub report: DiscoveryReport,
    /// Identifiers newly appended to the queue.
    pub queued: usize,
}

pub(crate) async fn execute(context: &AppContext, args: &DiscoverArgs) -> Result<DiscoveryOutcome> {
    let config = context.config();
    let base = args
        .count
        .or(context.credentials().reels_to_collect)
        .unwrap_or(config.discovery.target_count);
    let target = randomized_target(base, config.discovery.target_jitter);
    info!(base, target, "discovery target chosen");

    let launcher = BrowserLauncher::new(config.browser.clone());
    let overrides = LaunchOverrides {
        headless: args.headful.then_some(false),
    };
    let automation = launcher.launch_with_overrides(overrides).await?;

    let outcome = collect(context, &automation, target).await;
    if let Err(err) = automation.shutdown().await {
        warn!(error = %err, "browser shutdown failed");
    }
    let (session, report) = outcome?;

    let queued = report.persist(&context.queue()).await?;
    Ok(DiscoveryOutcome {
        session,
        report,
        queued,
    })
}

async fn collect(
    context: &AppContext,
    automation: &BrowserAutomation,
    target: usize,
) -> Result<(SessionOrigin, DiscoveryReport)> {
    let config = context.config();
    let browser_context = automation.new_context().await?;

    let authenticator = SessionAuthenticator::new(config.login.clone(), context.session_store());
    let session = authenticator
        .ensure_session(&browser_context, context.credentials().instagram_login().ok())
        .await?;

    let mut discovery = DiscoveryLoop::new(DiscoveryConfig::from(&config.discovery))?;
    let mut feed = BrowserFeedSession::new(browser_context);
    let report = discovery.run(&mut feed, target).await?;
    Ok((session, report))
}
