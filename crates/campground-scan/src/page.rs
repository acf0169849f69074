//! Browsing capability consumed by probes and booking.
//!
//! The scan pipeline never talks to a browser directly. It drives a
//! [`PageSession`] obtained from a [`BrowsingEngine`]; the Chromium
//! implementation lives in `session_manager`, tests use an in-memory fake.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::request_filter::RequestFilter;

/// Errors surfaced by browsing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    /// A wait expired.
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout {
        /// What was awaited.
        what: String,
        /// Configured limit.
        after: Duration,
    },

    /// A required element is not on the page.
    #[error("element not found: {0}")]
    NotFound(String),

    /// Navigation to a URL failed.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The browser engine reported an error.
    #[error("browser error: {0}")]
    Engine(String),
}

/// Something a session can wait for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// An element matching the CSS selector exists.
    Selector(String),
    /// No network request has been in flight for a short quiet period.
    NetworkIdle,
    /// A navigation of the main frame has completed.
    ///
    /// Only meaningful when armed before the triggering action, see
    /// [`PageSession::click_and_wait`].
    Navigation,
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitCondition::Selector(selector) => write!(f, "selector {}", selector),
            WaitCondition::NetworkIdle => write!(f, "network idle"),
            WaitCondition::Navigation => write!(f, "navigation"),
        }
    }
}

/// A clickable or typeable element on a page.
#[async_trait]
pub trait ElementHandle: Send + Sync {
    /// Clicks the element.
    async fn click(&self) -> Result<(), PageError>;

    /// Types text into the element.
    async fn type_text(&self, text: &str) -> Result<(), PageError>;
}

/// One isolated browsing context owned by exactly one task at a time.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Routes every outbound request of this session through `filter`.
    async fn attach_filter(&mut self, filter: Arc<RequestFilter>) -> Result<(), PageError>;

    /// Navigates to `url` and waits for the load.
    async fn navigate(&mut self, url: &str) -> Result<(), PageError>;

    /// First element matching `selector`, if any.
    async fn find_element(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle>>, PageError>;

    /// All elements matching `selector`, in document order.
    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, PageError>;

    /// Waits for `condition`; expiry yields [`PageError::Timeout`].
    async fn wait_for(&self, condition: &WaitCondition, timeout: Duration) -> Result<(), PageError>;

    /// Clicks `element` and waits for what the click sets off.
    ///
    /// The wait is armed before the click, so a transition that only starts
    /// after the click returns is still observed.
    async fn click_and_wait(
        &self,
        element: &dyn ElementHandle,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> Result<(), PageError>;

    /// Picks `value` in the `<select>` matching `selector`.
    async fn select_option(&self, selector: &str, value: &str) -> Result<(), PageError>;

    /// Saves a full-page screenshot.
    async fn screenshot(&self, path: &Path) -> Result<(), PageError>;

    /// Releases the browsing context.
    async fn close(self: Box<Self>) -> Result<(), PageError>;
}

/// Factory for isolated page sessions sharing one browser.
#[async_trait]
pub trait BrowsingEngine: Send + Sync {
    /// Opens a fresh session.
    async fn open_session(&self) -> Result<Box<dyn PageSession>, PageError>;
}

/// A lookup by accessible name, written `aria/Name` or `aria/Name[role="button"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AriaQuery {
    /// Accessible name, whitespace-normalized.
    pub name: String,
    /// Required role, if any.
    pub role: Option<String>,
}

impl AriaQuery {
    /// Parses `selector`; plain CSS selectors yield `None`.
    pub fn parse(selector: &str) -> Option<Self> {
        let query = selector.strip_prefix("aria/")?;
        let (name, role) = match query
            .strip_suffix("\"]")
            .and_then(|rest| rest.rsplit_once("[role=\""))
        {
            Some((name, role)) => (name, Some(role.trim().to_string())),
            None => (query, None),
        };

        let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
        if name.is_empty() {
            return None;
        }
        Some(Self { name, role })
    }
}

/// Looks up an element that must be present right now.
pub async fn require_element(
    session: &dyn PageSession,
    selector: &str,
) -> Result<Box<dyn ElementHandle>, PageError> {
    session
        .find_element(selector)
        .await?
        .ok_or_else(|| PageError::NotFound(selector.to_string()))
}

/// Waits up to `timeout` for an element and returns it.
pub async fn wait_for_element(
    session: &dyn PageSession,
    selector: &str,
    timeout: Duration,
) -> Result<Box<dyn ElementHandle>, PageError> {
    session
        .wait_for(&WaitCondition::Selector(selector.to_string()), timeout)
        .await?;
    require_element(session, selector).await
}

/// Waits up to `timeout` for an element that may legitimately never appear.
pub async fn optional_element(
    session: &dyn PageSession,
    selector: &str,
    timeout: Duration,
) -> Result<Option<Box<dyn ElementHandle>>, PageError> {
    match session
        .wait_for(&WaitCondition::Selector(selector.to_string()), timeout)
        .await
    {
        Ok(()) => session.find_element(selector).await,
        Err(PageError::Timeout { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Clicks an input and types into it.
pub async fn fill(element: &dyn ElementHandle, text: &str) -> Result<(), PageError> {
    element.click().await?;
    element.type_text(text).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aria_query_with_role() {
        assert_eq!(
            AriaQuery::parse(r#"aria/Close modal[role="button"]"#),
            Some(AriaQuery {
                name: "Close modal".to_string(),
                role: Some("button".to_string()),
            })
        );
    }

    #[test]
    fn test_aria_query_name_only() {
        let query = AriaQuery::parse("aria/Number of  people").unwrap();
        assert_eq!(query.name, "Number of people");
        assert_eq!(query.role, None);
    }

    #[test]
    fn test_css_is_not_an_aria_query() {
        assert_eq!(AriaQuery::parse(r#"[aria-label="Number of people"]"#), None);
        assert_eq!(AriaQuery::parse("#email"), None);
        assert_eq!(AriaQuery::parse("aria/  "), None);
    }
}
