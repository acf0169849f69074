use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventFrameNavigated, EventLoadEventFired, EventNavigatedWithinDocument,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self, ErrorReason, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    SetUserAgentOverrideParams,
};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::page::*;
use crate::request_filter::{InterceptedRequest, RequestFilter};
use crate::scan_types::ScanError;

const POLL_STEP: Duration = Duration::from_millis(100);

/// Attribute tagging the elements matched by an accessible-name lookup.
const ARIA_MARK: &str = "data-campsite-ax";

/// Launch settings for the shared Chromium process
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Explicit browser executable; discovered when unset
    pub executable: Option<PathBuf>,

    /// Run without a window (default: true)
    pub headless: bool,

    /// Extra command-line switches
    pub args: Vec<String>,

    /// User agents to rotate through, one per session
    pub user_agents: Vec<String>,

    /// Limit for a single CDP request (default: 30 seconds)
    pub request_timeout: Duration,

    /// Limit for loading a listing page (default: 60 seconds)
    pub navigation_timeout: Duration,

    /// How long the network must stay quiet to count as idle (default: 500ms)
    pub network_idle_quiet: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            args: vec![
                "--no-sandbox".to_string(),
                "--disable-setuid-sandbox".to_string(),
            ],
            user_agents: vec![
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36".to_string(),
            ],
            request_timeout: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(60),
            network_idle_quiet: Duration::from_millis(500),
        }
    }
}

/// Find the Chromium binary path.
///
/// Checks `explicit`, then `CHROMIUM_PATH`, then the system `PATH`.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        warn!("Configured browser {} does not exist", path.display());
    }

    if let Ok(p) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    ["chromium", "chromium-browser", "google-chrome"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
}

/// One Chromium process shared by every session of a run
pub struct ChromiumEngine {
    browser: Browser,
    handler: JoinHandle<()>,
    settings: BrowserSettings,
    sessions_opened: AtomicUsize,
}

impl ChromiumEngine {
    /// Launch Chromium and start driving its CDP connection
    pub async fn launch(settings: BrowserSettings) -> Result<Self, ScanError> {
        let executable = find_chromium(settings.executable.as_deref()).ok_or_else(|| {
            ScanError::Browser("Chromium not found, set CHROMIUM_PATH".to_string())
        })?;
        info!("Launching {}", executable.display());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .request_timeout(settings.request_timeout);
        if !settings.headless {
            builder = builder.with_head();
        }
        for arg in &settings.args {
            builder = builder.arg(arg);
        }
        let config = builder
            .build()
            .map_err(|e| ScanError::Browser(format!("Invalid browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScanError::Browser(format!("Failed to launch Chromium: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
        });

        Ok(Self {
            browser,
            handler,
            settings,
            sessions_opened: AtomicUsize::new(0),
        })
    }

    /// Close the browser process
    pub async fn shutdown(mut self) -> Result<(), ScanError> {
        self.browser
            .close()
            .await
            .map_err(|e| ScanError::Browser(format!("Failed to close Chromium: {}", e)))?;
        if let Err(e) = self.browser.wait().await {
            warn!("Chromium did not exit cleanly: {}", e);
        }
        Ok(())
    }

    fn next_user_agent(&self) -> Option<&str> {
        let agents = &self.settings.user_agents;
        if agents.is_empty() {
            return None;
        }
        let n = self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        Some(agents[n % agents.len()].as_str())
    }

    async fn prepare(&self, page: &Page) -> Result<(), CdpError> {
        if let Some(agent) = self.next_user_agent() {
            page.set_user_agent(SetUserAgentOverrideParams::new(agent))
                .await?;
        }
        page.execute(network::EnableParams::default()).await?;
        Ok(())
    }
}

impl Drop for ChromiumEngine {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl BrowsingEngine for ChromiumEngine {
    async fn open_session(&self) -> Result<Box<dyn PageSession>, PageError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(engine_error)?;

        let activity = Arc::new(NetworkActivity::new());
        let prepared = match self.prepare(&page).await {
            Ok(()) => track_network(&page, activity.clone()).await,
            Err(e) => Err(e),
        };

        match prepared {
            Ok(tasks) => Ok(Box::new(ChromiumSession {
                page,
                activity,
                quiet: self.settings.network_idle_quiet,
                navigation_timeout: self.settings.navigation_timeout,
                marks: AtomicUsize::new(0),
                tasks,
            })),
            Err(e) => {
                let _ = page.close().await;
                Err(engine_error(e))
            }
        }
    }
}

fn engine_error(e: CdpError) -> PageError {
    PageError::Engine(e.to_string())
}

/// In-flight request accounting for one page
#[derive(Debug)]
struct NetworkActivity {
    in_flight: AtomicUsize,
    origin: Instant,
    last_change_ms: AtomicU64,
}

impl NetworkActivity {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            origin: Instant::now(),
            last_change_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_change_ms.store(now, Ordering::SeqCst);
    }

    fn request_started(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
    }

    fn request_done(&self) {
        // Requests issued before tracking began finish without a matching start.
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            });
        self.touch();
    }

    fn is_idle(&self, quiet: Duration) -> bool {
        let now = self.origin.elapsed().as_millis() as u64;
        let since_change = now.saturating_sub(self.last_change_ms.load(Ordering::SeqCst));
        self.in_flight.load(Ordering::SeqCst) == 0 && since_change >= quiet.as_millis() as u64
    }
}

async fn track_network(
    page: &Page,
    activity: Arc<NetworkActivity>,
) -> Result<Vec<JoinHandle<()>>, CdpError> {
    let mut sent = page.event_listener::<EventRequestWillBeSent>().await?;
    let mut finished = page.event_listener::<EventLoadingFinished>().await?;
    let mut failed = page.event_listener::<EventLoadingFailed>().await?;

    let mut tasks = Vec::with_capacity(3);
    let started = activity.clone();
    tasks.push(tokio::spawn(async move {
        while let Some(event) = sent.next().await {
            // A redirect reuses the request id of a request already counted.
            if event.redirect_response.is_none() {
                started.request_started();
            }
        }
    }));

    let done = activity.clone();
    tasks.push(tokio::spawn(async move {
        while finished.next().await.is_some() {
            done.request_done();
        }
    }));

    tasks.push(tokio::spawn(async move {
        while failed.next().await.is_some() {
            activity.request_done();
        }
    }));

    Ok(tasks)
}

/// A Chromium tab implementing [`PageSession`]
pub struct ChromiumSession {
    page: Page,
    activity: Arc<NetworkActivity>,
    quiet: Duration,
    navigation_timeout: Duration,
    marks: AtomicUsize,
    tasks: Vec<JoinHandle<()>>,
}

impl ChromiumSession {
    /// Turns `selector` into CSS, tagging accessible-name matches in the DOM.
    async fn resolve<'s>(&self, selector: &'s str) -> Result<Cow<'s, str>, PageError> {
        let Some(query) = AriaQuery::parse(selector) else {
            return Ok(Cow::Borrowed(selector));
        };

        let mark = format!("m{}", self.marks.fetch_add(1, Ordering::Relaxed));
        let matched: u64 = self
            .page
            .evaluate(aria_mark_script(&query, &mark)?)
            .await
            .map_err(engine_error)?
            .into_value()
            .map_err(|e| PageError::Engine(e.to_string()))?;
        debug!("{} matched {} elements", selector, matched);

        Ok(Cow::Owned(format!("[{}=\"{}\"]", ARIA_MARK, mark)))
    }

    fn element(&self, element: Element) -> Box<dyn ElementHandle> {
        Box::new(ChromiumElement {
            element,
            activity: self.activity.clone(),
        })
    }

    async fn click_and_navigate(
        &self,
        element: &dyn ElementHandle,
        limit: Duration,
    ) -> Result<(), PageError> {
        let main_frame = self.page.mainframe().await.map_err(engine_error)?;
        let mut navigated = self
            .page
            .event_listener::<EventFrameNavigated>()
            .await
            .map_err(engine_error)?;
        let mut within_document = self
            .page
            .event_listener::<EventNavigatedWithinDocument>()
            .await
            .map_err(engine_error)?;
        let mut loaded = self
            .page
            .event_listener::<EventLoadEventFired>()
            .await
            .map_err(engine_error)?;

        element.click().await?;

        let settled = async {
            loop {
                tokio::select! {
                    Some(event) = navigated.next() => {
                        if event.frame.parent_id.is_none() {
                            return match loaded.next().await {
                                Some(_) => Ok(()),
                                None => Err(PageError::Navigation(
                                    "page closed while loading".to_string(),
                                )),
                            };
                        }
                    }
                    Some(event) = within_document.next() => {
                        if main_frame.as_ref().is_none_or(|frame| *frame == event.frame_id) {
                            return Ok(());
                        }
                    }
                    else => {
                        return Err(PageError::Navigation(
                            "page closed before navigating".to_string(),
                        ));
                    }
                }
            }
        };

        timeout(limit, settled).await.map_err(|_| PageError::Timeout {
            what: WaitCondition::Navigation.to_string(),
            after: limit,
        })?
    }

    async fn poll_until<F, Fut>(
        &self,
        what: &WaitCondition,
        limit: Duration,
        mut check: F,
    ) -> Result<(), PageError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let waiting = async {
            while !check().await {
                sleep(POLL_STEP).await;
            }
        };
        timeout(limit, waiting).await.map_err(|_| PageError::Timeout {
            what: what.to_string(),
            after: limit,
        })
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn attach_filter(&mut self, filter: Arc<RequestFilter>) -> Result<(), PageError> {
        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(engine_error)?;

        let pattern = RequestPattern::builder().url_pattern("*").build();
        self.page
            .execute(fetch::EnableParams::builder().patterns(vec![pattern]).build())
            .await
            .map_err(engine_error)?;

        let page = self.page.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let mut request = ChromiumRequest::new(page.clone(), event);
                filter.apply(&mut request).await;
            }
        }));
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), PageError> {
        debug!("Navigating to {}", url);
        match timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(PageError::Navigation(format!("{}: {}", url, e))),
            Err(_) => Err(PageError::Navigation(format!("{}: timed out", url))),
        }
    }

    async fn find_element(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle>>, PageError> {
        let css = self.resolve(selector).await?;
        match self.page.find_element(css.as_ref()).await {
            Ok(element) => Ok(Some(self.element(element))),
            Err(e) => {
                debug!("No element for {}: {}", selector, e);
                Ok(None)
            }
        }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, PageError> {
        let css = self.resolve(selector).await?;
        let elements = self
            .page
            .find_elements(css.as_ref())
            .await
            .map_err(engine_error)?;

        Ok(elements
            .into_iter()
            .map(|element| self.element(element))
            .collect())
    }

    async fn wait_for(&self, condition: &WaitCondition, limit: Duration) -> Result<(), PageError> {
        match condition {
            WaitCondition::Selector(selector) => {
                self.poll_until(condition, limit, || async {
                    match self.resolve(selector).await {
                        Ok(css) => self.page.find_element(css.as_ref()).await.is_ok(),
                        Err(_) => false,
                    }
                })
                .await
            }
            WaitCondition::NetworkIdle => {
                self.poll_until(condition, limit, || async {
                    self.activity.is_idle(self.quiet)
                })
                .await
            }
            WaitCondition::Navigation => match timeout(limit, self.page.wait_for_navigation()).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(PageError::Navigation(e.to_string())),
                Err(_) => Err(PageError::Timeout {
                    what: condition.to_string(),
                    after: limit,
                }),
            },
        }
    }

    async fn click_and_wait(
        &self,
        element: &dyn ElementHandle,
        condition: &WaitCondition,
        limit: Duration,
    ) -> Result<(), PageError> {
        match condition {
            WaitCondition::Navigation => self.click_and_navigate(element, limit).await,
            // Clicks count as activity, so idleness is measured from the click.
            _ => {
                element.click().await?;
                self.wait_for(condition, limit).await
            }
        }
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), PageError> {
        let css = self.resolve(selector).await?;
        let quoted_selector =
            serde_json::to_string(css.as_ref()).map_err(|e| PageError::Engine(e.to_string()))?;
        let quoted_value =
            serde_json::to_string(value).map_err(|e| PageError::Engine(e.to_string()))?;

        let script = format!(
            "(() => {{ \
                const el = document.querySelector({}); \
                if (!el) return false; \
                el.value = {}; \
                el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                return true; \
            }})()",
            quoted_selector, quoted_value
        );

        let found: bool = self
            .page
            .evaluate(script)
            .await
            .map_err(engine_error)?
            .into_value()
            .map_err(|e| PageError::Engine(e.to_string()))?;

        if found {
            Ok(())
        } else {
            Err(PageError::NotFound(selector.to_string()))
        }
    }

    async fn screenshot(&self, path: &Path) -> Result<(), PageError> {
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(engine_error)?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), PageError> {
        let page = self.page.clone();
        drop(self);
        page.close().await.map_err(engine_error)
    }
}

/// Script tagging every element whose accessible name matches `query` with `mark`.
///
/// Covers `aria-label`, `aria-labelledby`, associated `<label>`s and `title`.
/// Returns the number of tagged elements.
fn aria_mark_script(query: &AriaQuery, mark: &str) -> Result<String, PageError> {
    let quote =
        |value: &str| serde_json::to_string(value).map_err(|e| PageError::Engine(e.to_string()));
    let role = match &query.role {
        Some(role) => quote(role)?,
        None => "null".to_string(),
    };

    Ok(format!(
        "(() => {{ \
            const name = {name}, role = {role}, attr = {attr}, mark = {mark}; \
            const clean = s => (s || '').replace(/\\s+/g, ' ').trim(); \
            const byIds = ids => ids.split(/\\s+/) \
                .map(id => document.getElementById(id)) \
                .map(el => el ? el.textContent : '').join(' '); \
            const names = el => {{ \
                const found = [el.getAttribute('aria-label')]; \
                const ids = el.getAttribute('aria-labelledby'); \
                if (ids) found.push(byIds(ids)); \
                if (el.labels) for (const label of el.labels) found.push(label.textContent); \
                found.push(el.getAttribute('title')); \
                return found.map(clean); \
            }}; \
            const roleOf = el => el.getAttribute('role') || \
                (el.tagName === 'BUTTON' ? 'button' : el.tagName === 'A' ? 'link' : null); \
            document.querySelectorAll('[' + attr + ']').forEach(el => el.removeAttribute(attr)); \
            let count = 0; \
            for (const el of document.querySelectorAll('*')) {{ \
                if (role && roleOf(el) !== role) continue; \
                if (!names(el).includes(name)) continue; \
                el.setAttribute(attr, mark); \
                count += 1; \
            }} \
            return count; \
        }})()",
        name = quote(&query.name)?,
        role = role,
        attr = quote(ARIA_MARK)?,
        mark = quote(mark)?,
    ))
}

struct ChromiumElement {
    element: Element,
    activity: Arc<NetworkActivity>,
}

#[async_trait]
impl ElementHandle for ChromiumElement {
    async fn click(&self) -> Result<(), PageError> {
        self.element.click().await.map_err(engine_error)?;
        self.activity.touch();
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), PageError> {
        self.element.type_str(text).await.map_err(engine_error)?;
        self.activity.touch();
        Ok(())
    }
}

/// A request paused by the Fetch domain
struct ChromiumRequest {
    page: Page,
    event: Arc<EventRequestPaused>,
    resource_type: String,
    resolved: bool,
}

impl ChromiumRequest {
    fn new(page: Page, event: Arc<EventRequestPaused>) -> Self {
        let resource_type = event.resource_type.as_ref().to_ascii_lowercase();
        Self {
            page,
            event,
            resource_type,
            resolved: false,
        }
    }
}

#[async_trait]
impl InterceptedRequest for ChromiumRequest {
    fn url(&self) -> &str {
        &self.event.request.url
    }

    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn is_resolved(&self) -> bool {
        self.resolved
    }

    async fn abort(&mut self) -> Result<(), PageError> {
        self.page
            .execute(FailRequestParams::new(
                self.event.request_id.clone(),
                ErrorReason::BlockedByClient,
            ))
            .await
            .map_err(engine_error)?;
        self.resolved = true;
        Ok(())
    }

    async fn proceed(&mut self) -> Result<(), PageError> {
        self.page
            .execute(ContinueRequestParams::new(self.event.request_id.clone()))
            .await
            .map_err(engine_error)?;
        self.resolved = true;
        Ok(())
    }
}
