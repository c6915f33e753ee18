use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::LoginSection;
use crate::pacing::Pacer;
use crate::session::{SessionError, SessionStore};

use super::automation::BrowserContext;
use super::error::{BrowserError, BrowserResult};

const PROMPT_TIMEOUT: Duration = Duration::from_secs(10);
const PROMPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    Restored,
    FreshLogin,
}

/// Restores a saved browser session, or logs in and saves a new one.
pub struct SessionAuthenticator {
    config: LoginSection,
    store: SessionStore,
}

impl SessionAuthenticator {
    pub fn new(config: LoginSection, store: SessionStore) -> Self {
        Self { config, store }
    }

    pub async fn ensure_session(
        &self,
        context: &BrowserContext,
        credentials: Option<(String, String)>,
    ) -> BrowserResult<SessionOrigin> {
        match self.restore(context).await {
            Ok(true) => {
                if self.is_logged_in(context).await? {
                    info!(path = %self.store.path().display(), "restored saved session");
                    return Ok(SessionOrigin::Restored);
                }
                info!("saved session expired");
            }
            Ok(false) => info!("no saved session"),
            Err(err) => warn!(error = %err, "failed to restore saved session"),
        }

        let (username, password) = credentials.ok_or_else(|| {
            BrowserError::Authentication("no valid session and no login credentials".into())
        })?;
        self.login(context, &username, &password).await?;
        Ok(SessionOrigin::FreshLogin)
    }

    /// Loads saved cookies into the browser. Returns false when there are none.
    pub async fn restore(&self, context: &BrowserContext) -> BrowserResult<bool> {
        let cookies = match self.store.load().await {
            Ok(cookies) => cookies,
            Err(SessionError::Missing { .. }) => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        context.goto(&self.config.home_url).await?;
        Pacer::from_millis(self.config.settle_ms).wait().await;
        context.clear_cookies().await?;
        context.set_cookies(&cookies).await?;
        debug!(count = cookies.len(), "session cookies loaded into browser");
        Ok(true)
    }

    pub async fn is_logged_in(&self, context: &BrowserContext) -> BrowserResult<bool> {
        context.goto(&self.config.home_url).await?;
        match context
            .wait_for_selector(&self.config.logged_in_selector, self.wait_timeout())
            .await
        {
            Ok(()) => Ok(true),
            Err(BrowserError::Timeout(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn login(
        &self,
        context: &BrowserContext,
        username: &str,
        password: &str,
    ) -> BrowserResult<()> {
        info!("logging in");
        context.goto(&self.config.home_url).await?;
        Pacer::from_millis(self.config.settle_ms).wait().await;
        context
            .wait_for_selector("input", self.wait_timeout())
            .await
            .map_err(|err| BrowserError::Authentication(format!("login form not found: {err}")))?;

        let inputs = context.page().find_elements("input").await?;
        if inputs.len() < 2 {
            return Err(BrowserError::Authentication(
                "couldn't find login fields".into(),
            ));
        }
        let typing = Pacer::from_millis(self.config.typing_delay_ms);
        for (element, text) in inputs.iter().zip([username, password]) {
            element.click().await?;
            for ch in text.chars() {
                element.type_str(ch.to_string()).await?;
                typing.wait().await;
            }
        }

        let labels = self
            .config
            .login_button_labels
            .iter()
            .map(|label| label.to_lowercase())
            .collect::<Vec<_>>();
        if !context
            .evaluate_bool(&click_button_script(&labels, true))
            .await?
        {
            return Err(BrowserError::Authentication(
                "login button not found".into(),
            ));
        }
        Pacer::from_millis(self.config.settle_ms).wait().await;

        for label in &self.config.dismiss_labels {
            self.dismiss_prompt(context, label).await;
        }

        context
            .wait_for_selector(&self.config.logged_in_selector, self.wait_timeout())
            .await
            .map_err(|err| BrowserError::Authentication(format!("login not confirmed: {err}")))?;

        let cookies = context.cookies().await?;
        self.store.save(&cookies).await?;
        info!(path = %self.store.path().display(), "login successful, session saved");
        Ok(())
    }

    async fn dismiss_prompt(&self, context: &BrowserContext, label: &str) {
        let script = click_button_script(&[label.to_lowercase()], false);
        let deadline = Instant::now() + PROMPT_TIMEOUT;
        while Instant::now() < deadline {
            match context.evaluate_bool(&script).await {
                Ok(true) => {
                    debug!(label, "dismissed prompt");
                    return;
                }
                Ok(false) => tokio::time::sleep(PROMPT_POLL_INTERVAL).await,
                Err(err) => {
                    debug!(label, error = %err, "prompt check failed");
                    return;
                }
            }
        }
    }

    fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.config.wait_timeout_seconds)
    }
}

/// Script that clicks the first button whose lowercased text matches one of
/// `labels` (exactly, or by substring) and reports whether it clicked.
fn click_button_script(labels: &[String], exact: bool) -> String {
    let labels = serde_json::to_string(labels).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"
(() => {{
    const labels = {labels};
    const exact = {exact};
    const buttons = Array.from(document.querySelectorAll('button, div[role="button"]'));
    const target = buttons.find(button => {{
        const text = (button.textContent || '').trim().toLowerCase();
        return labels.some(label => exact ? text === label : text.includes(label));
    }});
    if (target) {{
        target.click();
        return true;
    }}
    return false;
}})()
"#
    )
}
