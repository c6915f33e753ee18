use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCookiesParams, CookieParam, CookieSameSite, SetUserAgentOverrideParams,
    TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::BrowserSection;
use crate::session::{SameSite, StoredCookie};

use super::error::{BrowserError, BrowserResult};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Default)]
pub struct LaunchOverrides {
    pub headless: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: Arc<BrowserSection>,
}

impl BrowserLauncher {
    pub fn new(config: BrowserSection) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &BrowserSection {
        &self.config
    }

    pub async fn launch(&self) -> BrowserResult<BrowserAutomation> {
        self.launch_with_overrides(LaunchOverrides::default()).await
    }

    pub async fn launch_with_overrides(
        &self,
        overrides: LaunchOverrides,
    ) -> BrowserResult<BrowserAutomation> {
        let profile = tempfile::Builder::new()
            .prefix("reelpipe-profile-")
            .tempdir()
            .map_err(BrowserError::Io)?;
        let headless = overrides.headless.unwrap_or(self.config.headless);
        let user_agent = self
            .config
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let chromium_config = self.build_chromium_config(&profile, &user_agent, headless)?;
        info!(
            profile = %profile.path().display(),
            width = self.config.window[0],
            height = self.config.window[1],
            headless,
            "launching chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });

        Ok(BrowserAutomation {
            browser,
            profile: Some(profile),
            handler_task: Some(handler_task),
            config: Arc::clone(&self.config),
            user_agent,
        })
    }

    fn build_chromium_config(
        &self,
        profile: &TempDir,
        user_agent: &str,
        headless: bool,
    ) -> BrowserResult<ChromiumConfig> {
        let [width, height] = self.config.window;
        let mut builder = ChromiumConfig::builder()
            .chrome_executable(&self.config.executable_path)
            .user_data_dir(profile.path())
            .viewport(ChromiumViewport {
                width,
                height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: width >= height,
                has_touch: false,
            });

        if !headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![
            format!("--user-agent={user_agent}"),
            format!("--window-size={width},{height}"),
            "--no-first-run".to_string(),
            "--password-store=basic".to_string(),
        ];
        if self.config.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if self.config.disable_notifications {
            args.push("--disable-notifications".into());
        }
        if self.config.disable_automation_controlled {
            args.push("--disable-blink-features=AutomationControlled".into());
        }
        if let Some(lang) = &self.config.lang {
            args.push(format!("--lang={lang}"));
        }

        builder = builder.args(args);
        builder.build().map_err(BrowserError::Configuration)
    }
}

#[derive(Debug)]
pub struct BrowserAutomation {
    browser: Browser,
    profile: Option<TempDir>,
    handler_task: Option<JoinHandle<()>>,
    config: Arc<BrowserSection>,
    user_agent: String,
}

impl BrowserAutomation {
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn new_context(&self) -> BrowserResult<BrowserContext> {
        let params = CreateTargetParams::new("about:blank");
        let page = self.browser.new_page(params).await?;
        let params = SetUserAgentOverrideParams::builder()
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(BrowserError::Configuration)?;
        page.set_user_agent(params).await?;
        Ok(BrowserContext { page })
    }

    pub async fn shutdown(mut self) -> BrowserResult<()> {
        info!("shutting down chromium instance");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "browser handler join error");
            }
        }
        if let Some(profile) = self.profile.take() {
            if let Err(err) = profile.close() {
                warn!(error = %err, "failed to remove browser profile directory");
            }
        }
        debug!(headless = self.config.headless, "chromium instance closed");
        Ok(())
    }
}

impl Drop for BrowserAutomation {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!("BrowserAutomation dropped without explicit shutdown");
            }
        }
    }
}

/// One browser tab.
#[derive(Debug)]
pub struct BrowserContext {
    page: Page,
}

impl BrowserContext {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn goto(&self, url: &str) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.goto(params).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    pub async fn current_url(&self) -> BrowserResult<String> {
        self.evaluate_string("window.location.href").await
    }

    pub async fn evaluate_string(&self, script: &str) -> BrowserResult<String> {
        self.page
            .evaluate(script)
            .await?
            .into_value::<String>()
            .map_err(|err| BrowserError::Unexpected(format!("failed to decode script result: {err}")))
    }

    pub async fn evaluate_bool(&self, script: &str) -> BrowserResult<bool> {
        self.page
            .evaluate(script)
            .await?
            .into_value::<bool>()
            .map_err(|err| BrowserError::Unexpected(format!("failed to decode script result: {err}")))
    }

    /// Dispatches a key down/up pair to the focused document.
    pub async fn press_key(&self, key: &str, key_code: i64) -> BrowserResult<()> {
        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let params = DispatchKeyEventParams::builder()
                .r#type(kind)
                .key(key)
                .code(key)
                .windows_virtual_key_code(key_code)
                .native_virtual_key_code(key_code)
                .build()
                .map_err(BrowserError::Configuration)?;
            self.page.execute(params).await?;
        }
        Ok(())
    }

    pub async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(selector.to_string()));
            }
            sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    pub async fn cookies(&self) -> BrowserResult<Vec<StoredCookie>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .map(|cookie| StoredCookie {
                name: cookie.name,
                value: cookie.value,
                domain: Some(cookie.domain),
                path: Some(cookie.path),
                expiry: (cookie.expires > 0.0).then_some(cookie.expires),
                http_only: cookie.http_only,
                secure: cookie.secure,
                same_site: cookie.same_site.map(|site| {
                    match site {
                        CookieSameSite::Strict => SameSite::Strict,
                        CookieSameSite::Lax => SameSite::Lax,
                        CookieSameSite::None => SameSite::None,
                    }
                    .as_str()
                    .to_string()
                }),
            })
            .collect())
    }

    pub async fn set_cookies(&self, cookies: &[StoredCookie]) -> BrowserResult<()> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone())
                .http_only(cookie.http_only)
                .secure(cookie.secure)
                .same_site(match cookie.same_site() {
                    SameSite::Strict => CookieSameSite::Strict,
                    SameSite::Lax => CookieSameSite::Lax,
                    SameSite::None => CookieSameSite::None,
                });
            if let Some(domain) = &cookie.domain {
                builder = builder.domain(domain.clone());
            }
            if let Some(path) = &cookie.path {
                builder = builder.path(path.clone());
            }
            if let Some(expiry) = cookie.expiry {
                builder = builder.expires(TimeSinceEpoch::new(expiry));
            }
            params.push(builder.build().map_err(BrowserError::Configuration)?);
        }
        self.page.set_cookies(params).await?;
        Ok(())
    }

    pub async fn clear_cookies(&self) -> BrowserResult<()> {
        self.page.execute(ClearBrowserCookiesParams::default()).await?;
        Ok(())
    }
}
