//! In-memory browsing engine for tests.
//!
//! Every session operation is appended to a shared journal so tests can assert
//! ordering, absence of calls and release counts without a browser.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::page::*;
use crate::probe::ProbeSettings;
use crate::profile::*;
use crate::request_filter::{FilterRules, RequestFilter};
use crate::scan_types::DateWindow;
use crate::selectors::{SiteSelectors, StepTimeouts};

const CLAIM: &str = "#claim";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    AttachFilter,
    Navigate(String),
    Find(String),
    Click(String),
    Type(String, String),
    Wait(WaitCondition),
    Select(String, String),
    Screenshot,
    Close,
}

impl Op {
    fn selector(&self) -> Option<&str> {
        match self {
            Op::Find(s) | Op::Click(s) | Op::Type(s, _) | Op::Select(s, _) => Some(s),
            Op::Wait(WaitCondition::Selector(s)) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub session: usize,
    pub url: Option<String>,
    pub op: Op,
}

/// Behaviour of one listing URL.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeSite {
    claims: usize,
    missing: HashSet<String>,
    failing_clicks: HashSet<String>,
    stalled: Vec<(Option<String>, WaitCondition)>,
    delay: Duration,
}

impl FakeSite {
    pub fn available(claims: usize) -> Self {
        Self {
            claims,
            ..Default::default()
        }
    }

    pub fn without(mut self, selector: &str) -> Self {
        self.missing.insert(selector.to_string());
        self
    }

    pub fn failing_click(mut self, selector: &str) -> Self {
        self.failing_clicks.insert(selector.to_string());
        self
    }

    /// Waits for `condition` never finish.
    pub fn stalling(mut self, condition: WaitCondition) -> Self {
        self.stalled.push((None, condition));
        self
    }

    /// Waits for `condition` never finish once `trigger` has been clicked.
    pub fn stalling_after(mut self, trigger: &str, condition: WaitCondition) -> Self {
        self.stalled.push((Some(trigger.to_string()), condition));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn count(&self, selector: &str) -> usize {
        if self.missing.contains(selector) {
            0
        } else if selector == CLAIM {
            self.claims
        } else {
            1
        }
    }
}

#[derive(Default)]
struct Shared {
    journal: Mutex<Vec<Entry>>,
    open: AtomicUsize,
    next_session: AtomicUsize,
    closes: Mutex<HashMap<String, usize>>,
}

impl Shared {
    fn record(&self, session: usize, url: Option<&str>, op: Op) {
        self.journal.lock().unwrap().push(Entry {
            session,
            url: url.map(str::to_string),
            op,
        });
    }
}

pub(crate) struct FakeEngine {
    sites: Arc<HashMap<String, FakeSite>>,
    shared: Arc<Shared>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            sites: Arc::new(HashMap::new()),
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn with_site(mut self, url: &str, site: FakeSite) -> Self {
        Arc::make_mut(&mut self.sites).insert(url.to_string(), site);
        self
    }

    pub fn journal(&self) -> Vec<Entry> {
        self.shared.journal.lock().unwrap().clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    pub fn closes_for(&self, url: &str) -> usize {
        self.shared
            .closes
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn session_ops(&self, session: usize) -> Vec<Op> {
        self.journal()
            .into_iter()
            .filter(|entry| entry.session == session)
            .map(|entry| entry.op)
            .collect()
    }

    pub fn ops_for(&self, url: &str) -> Vec<Op> {
        self.journal()
            .into_iter()
            .filter(|entry| entry.url.as_deref() == Some(url))
            .map(|entry| entry.op)
            .collect()
    }

    /// Journal index of the first `op` recorded against `url`.
    pub fn position(&self, url: &str, op: &Op) -> Option<usize> {
        self.journal()
            .iter()
            .position(|entry| entry.url.as_deref() == Some(url) && &entry.op == op)
    }

    pub fn clicked(&self, url: &str, selector: &str) -> bool {
        self.ops_for(url)
            .contains(&Op::Click(selector.to_string()))
    }

    pub fn typed(&self, url: &str, selector: &str, text: &str) -> bool {
        self.ops_for(url)
            .contains(&Op::Type(selector.to_string(), text.to_string()))
    }

    /// Operation recorded against `url` right after the first `op`.
    pub fn followed_by(&self, url: &str, op: &Op) -> Option<Op> {
        let ops = self.ops_for(url);
        let index = ops.iter().position(|candidate| candidate == op)?;
        ops.get(index + 1).cloned()
    }

    pub fn touched(&self, url: &str, selector: &str) -> bool {
        self.ops_for(url)
            .iter()
            .any(|op| op.selector() == Some(selector))
    }
}

#[async_trait]
impl BrowsingEngine for FakeEngine {
    async fn open_session(&self) -> Result<Box<dyn PageSession>, PageError> {
        let id = self.shared.next_session.fetch_add(1, Ordering::SeqCst);
        self.shared.open.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeSession {
            id,
            url: None,
            site: None,
            sites: self.sites.clone(),
            shared: self.shared.clone(),
        }))
    }
}

struct FakeSession {
    id: usize,
    url: Option<String>,
    site: Option<FakeSite>,
    sites: Arc<HashMap<String, FakeSite>>,
    shared: Arc<Shared>,
}

impl FakeSession {
    fn record(&self, op: Op) {
        self.shared.record(self.id, self.url.as_deref(), op);
    }

    fn count(&self, selector: &str) -> usize {
        self.site
            .as_ref()
            .map(|site| site.count(selector))
            .unwrap_or(0)
    }

    fn has_clicked(&self, selector: &str) -> bool {
        let click = Op::Click(selector.to_string());
        self.shared
            .journal
            .lock()
            .unwrap()
            .iter()
            .any(|entry| entry.session == self.id && entry.op == click)
    }

    fn settle(&self, condition: &WaitCondition, timeout: Duration) -> Result<(), PageError> {
        let stalled = match condition {
            WaitCondition::Selector(selector) => self.count(selector) == 0,
            other => self.site.as_ref().is_some_and(|site| {
                site.stalled.iter().any(|(trigger, stalled)| {
                    stalled == other
                        && trigger
                            .as_deref()
                            .is_none_or(|trigger| self.has_clicked(trigger))
                })
            }),
        };

        if stalled {
            Err(PageError::Timeout {
                what: condition.to_string(),
                after: timeout,
            })
        } else {
            Ok(())
        }
    }

    fn element(&self, selector: &str) -> Box<dyn ElementHandle> {
        let fails = self
            .site
            .as_ref()
            .is_some_and(|site| site.failing_clicks.contains(selector));

        Box::new(FakeElement {
            session: self.id,
            url: self.url.clone(),
            selector: selector.to_string(),
            fails,
            shared: self.shared.clone(),
        })
    }
}

#[async_trait]
impl PageSession for FakeSession {
    async fn attach_filter(&mut self, _filter: Arc<RequestFilter>) -> Result<(), PageError> {
        self.record(Op::AttachFilter);
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), PageError> {
        self.shared
            .record(self.id, Some(url), Op::Navigate(url.to_string()));

        let site = self
            .sites
            .get(url)
            .cloned()
            .ok_or_else(|| PageError::Navigation(format!("{} is unreachable", url)))?;

        tokio::time::sleep(site.delay).await;
        self.url = Some(url.to_string());
        self.site = Some(site);
        Ok(())
    }

    async fn find_element(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle>>, PageError> {
        self.record(Op::Find(selector.to_string()));
        if self.count(selector) > 0 {
            Ok(Some(self.element(selector)))
        } else {
            Ok(None)
        }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, PageError> {
        self.record(Op::Find(selector.to_string()));
        Ok((0..self.count(selector))
            .map(|_| self.element(selector))
            .collect())
    }

    async fn wait_for(&self, condition: &WaitCondition, timeout: Duration) -> Result<(), PageError> {
        self.record(Op::Wait(condition.clone()));
        self.settle(condition, timeout)
    }

    async fn click_and_wait(
        &self,
        element: &dyn ElementHandle,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> Result<(), PageError> {
        element.click().await?;
        self.record(Op::Wait(condition.clone()));
        self.settle(condition, timeout)
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), PageError> {
        self.record(Op::Select(selector.to_string(), value.to_string()));
        if self.count(selector) == 0 {
            return Err(PageError::NotFound(selector.to_string()));
        }
        Ok(())
    }

    async fn screenshot(&self, _path: &Path) -> Result<(), PageError> {
        self.record(Op::Screenshot);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), PageError> {
        self.record(Op::Close);
        self.shared.open.fetch_sub(1, Ordering::SeqCst);
        *self
            .shared
            .closes
            .lock()
            .unwrap()
            .entry(self.url.clone().unwrap_or_else(|| "about:blank".to_string()))
            .or_insert(0) += 1;
        Ok(())
    }
}

struct FakeElement {
    session: usize,
    url: Option<String>,
    selector: String,
    fails: bool,
    shared: Arc<Shared>,
}

#[async_trait]
impl ElementHandle for FakeElement {
    async fn click(&self) -> Result<(), PageError> {
        self.shared.record(
            self.session,
            self.url.as_deref(),
            Op::Click(self.selector.clone()),
        );
        if self.fails {
            return Err(PageError::Engine(format!(
                "click on {} intercepted by overlay",
                self.selector
            )));
        }
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), PageError> {
        self.shared.record(
            self.session,
            self.url.as_deref(),
            Op::Type(self.selector.clone(), text.to_string()),
        );
        Ok(())
    }
}

pub(crate) fn test_selectors() -> SiteSelectors {
    SiteSelectors {
        close_modal: "#close-modal".to_string(),
        list_view: "#list-view".to_string(),
        start_date: "#start-date".to_string(),
        end_date: "#end-date".to_string(),
        claim_control: CLAIM.to_string(),
        proceed_prompt: "#proceed".to_string(),
        sign_in_button: "#sign-in".to_string(),
        email_field: "#email".to_string(),
        password_field: "#password".to_string(),
        party_size_field: "#party-size".to_string(),
        equipment_option: "#tent".to_string(),
        vehicle_count_field: "#vehicles".to_string(),
        acknowledgment: "#need-to-know".to_string(),
        details_submit: "#details-submit".to_string(),
        checkout_button: "#checkout".to_string(),
        cardholder_name_field: "#card-name".to_string(),
        card_number_field: "#card-number".to_string(),
        expiry_month_select: "#exp-month".to_string(),
        expiry_year_select: "#exp-year".to_string(),
        security_code_field: "#cvc".to_string(),
        payment_next_button: "#payment-next".to_string(),
        confirm_button: "#confirm".to_string(),
        date_format: "%m/%d/%Y".to_string(),
    }
}

pub(crate) fn test_window() -> DateWindow {
    DateWindow::new(
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
    )
    .unwrap()
}

pub(crate) fn test_timeouts() -> StepTimeouts {
    StepTimeouts {
        date_entry_pause: Duration::ZERO,
        ..StepTimeouts::default()
    }
}

pub(crate) fn test_settings() -> ProbeSettings {
    ProbeSettings {
        selectors: Arc::new(test_selectors()),
        timeouts: test_timeouts(),
        window: test_window(),
        filter: Arc::new(RequestFilter::new(&FilterRules::new(
            ["image"],
            ["tracker.example.com"],
        ))),
    }
}

pub(crate) fn test_profile() -> BookingProfile {
    BookingProfile {
        credentials: Credentials {
            username: "camper@example.com".to_string(),
            password: "hunter2".to_string(),
        },
        payment: PaymentDetails {
            cardholder_name: "Pat Camper".to_string(),
            card_number: "4111111111111111".to_string(),
            expiry_month: "09".to_string(),
            expiry_year: "2030".to_string(),
            security_code: "123".to_string(),
        },
        order: OrderDetails::default(),
    }
}
