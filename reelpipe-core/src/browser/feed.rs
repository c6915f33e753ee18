use async_trait::async_trait;
use tracing::trace;

use super::automation::BrowserContext;
use super::error::BrowserResult;

const ARROW_DOWN: &str = "ArrowDown";
const ARROW_DOWN_KEY_CODE: i64 = 40;

/// The live feed view the discovery loop scrolls through.
///
/// Any error returned here is a session fault and ends the discovery run.
#[async_trait(?Send)]
pub trait FeedSession {
    async fn open(&mut self, url: &str) -> BrowserResult<()>;
    async fn current_location(&mut self) -> BrowserResult<String>;
    async fn advance(&mut self) -> BrowserResult<()>;
}

/// Feed session backed by a chromium tab. The address bar follows the post on
/// screen, and ArrowDown moves the player to the next one.
pub struct BrowserFeedSession {
    context: BrowserContext,
}

impl BrowserFeedSession {
    pub fn new(context: BrowserContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &BrowserContext {
        &self.context
    }
}

#[async_trait(?Send)]
impl FeedSession for BrowserFeedSession {
    async fn open(&mut self, url: &str) -> BrowserResult<()> {
        trace!(url, "opening feed");
        self.context.goto(url).await
    }

    async fn current_location(&mut self) -> BrowserResult<String> {
        self.context.current_url().await
    }

    async fn advance(&mut self) -> BrowserResult<()> {
        self.context.press_key(ARROW_DOWN, ARROW_DOWN_KEY_CODE).await
    }
}
