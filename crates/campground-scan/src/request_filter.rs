use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::page::PageError;

/// Blocked resource types and URL substrings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRules {
    /// Resource-type tags such as `image` or `font`.
    pub resource_types: Vec<String>,
    /// Any URL containing one of these is aborted.
    pub url_substrings: Vec<String>,
}

impl FilterRules {
    /// Creates a rule set from resource types and URL substrings.
    pub fn new<T, U>(resource_types: T, url_substrings: U) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        U: IntoIterator,
        U::Item: Into<String>,
    {
        Self {
            resource_types: resource_types.into_iter().map(Into::into).collect(),
            url_substrings: url_substrings.into_iter().map(Into::into).collect(),
        }
    }
}

/// Verdict for one outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Fail the request before it leaves the browser.
    Abort,
    /// Let the request through.
    Continue,
}

/// A paused outbound request waiting for exactly one verdict.
#[async_trait]
pub trait InterceptedRequest: Send {
    /// Request URL.
    fn url(&self) -> &str;

    /// Resource type as reported by the engine.
    fn resource_type(&self) -> &str;

    /// Whether a verdict was already applied.
    fn is_resolved(&self) -> bool;

    /// Fails the request.
    async fn abort(&mut self) -> Result<(), PageError>;

    /// Releases the request unchanged.
    async fn proceed(&mut self) -> Result<(), PageError>;
}

/// Immutable outbound-traffic policy shared by every session of a run.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    blocked_types: Vec<String>,
    blocked_substrings: Vec<String>,
}

impl RequestFilter {
    /// Builds a filter. Type tags are matched case-insensitively; empty entries are ignored.
    pub fn new(rules: &FilterRules) -> Self {
        Self {
            blocked_types: rules
                .resource_types
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            // An empty substring would match every URL.
            blocked_substrings: rules
                .url_substrings
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Pure verdict for a request.
    pub fn decide(&self, url: &str, resource_type: &str) -> FilterDecision {
        let type_blocked = self
            .blocked_types
            .iter()
            .any(|blocked| blocked.eq_ignore_ascii_case(resource_type));

        if type_blocked || self.blocked_substrings.iter().any(|s| url.contains(s.as_str())) {
            FilterDecision::Abort
        } else {
            FilterDecision::Continue
        }
    }

    /// Applies the verdict to a paused request.
    ///
    /// Returns the action taken, or `None` when the request had already been
    /// resolved. A failed abort falls back to continuing the request.
    pub async fn apply(&self, request: &mut dyn InterceptedRequest) -> Option<FilterDecision> {
        if request.is_resolved() {
            debug!("Request {} already resolved, skipping", request.url());
            return None;
        }

        match self.decide(request.url(), request.resource_type()) {
            FilterDecision::Abort => match request.abort().await {
                Ok(()) => {
                    debug!("Blocked {} request to {}", request.resource_type(), request.url());
                    Some(FilterDecision::Abort)
                }
                Err(e) => {
                    warn!("Failed to abort {}: {}, letting it through", request.url(), e);
                    if !request.is_resolved() {
                        if let Err(e) = request.proceed().await {
                            warn!("Failed to continue {}: {}", request.url(), e);
                        }
                    }
                    Some(FilterDecision::Continue)
                }
            },
            FilterDecision::Continue => {
                if let Err(e) = request.proceed().await {
                    warn!("Failed to continue {}: {}", request.url(), e);
                }
                Some(FilterDecision::Continue)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeRequest {
        url: String,
        resource_type: String,
        resolved: bool,
        aborts: usize,
        continues: usize,
        abort_fails: bool,
    }

    impl FakeRequest {
        fn new(url: &str, resource_type: &str) -> Self {
            Self {
                url: url.to_string(),
                resource_type: resource_type.to_string(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl InterceptedRequest for FakeRequest {
        fn url(&self) -> &str {
            &self.url
        }

        fn resource_type(&self) -> &str {
            &self.resource_type
        }

        fn is_resolved(&self) -> bool {
            self.resolved
        }

        async fn abort(&mut self) -> Result<(), PageError> {
            if self.abort_fails {
                return Err(PageError::Engine("request already gone".to_string()));
            }
            self.aborts += 1;
            self.resolved = true;
            Ok(())
        }

        async fn proceed(&mut self) -> Result<(), PageError> {
            self.continues += 1;
            self.resolved = true;
            Ok(())
        }
    }

    fn tracker_filter() -> RequestFilter {
        RequestFilter::new(&FilterRules::new(["image"], ["tracker.example.com"]))
    }

    #[test]
    fn test_decide_blocks_type_and_substring() {
        let filter = tracker_filter();

        assert_eq!(
            filter.decide("https://site.example.com/logo.png", "image"),
            FilterDecision::Abort
        );
        assert_eq!(
            filter.decide("https://tracker.example.com/x", "script"),
            FilterDecision::Abort
        );
        assert_eq!(
            filter.decide("https://site.example.com", "document"),
            FilterDecision::Continue
        );
    }

    #[test]
    fn test_decide_matches_engine_casing() {
        let filter = tracker_filter();
        assert_eq!(
            filter.decide("https://site.example.com/a.png", "Image"),
            FilterDecision::Abort
        );
    }

    #[test]
    fn test_empty_rules_allow_everything() {
        let filter = RequestFilter::new(&FilterRules::new(["  "], [""]));
        assert_eq!(
            filter.decide("https://anything.example.com", "image"),
            FilterDecision::Continue
        );
    }

    #[tokio::test]
    async fn test_apply_takes_exactly_one_action() {
        let filter = tracker_filter();
        let mut request = FakeRequest::new("https://tracker.example.com/x", "xhr");

        assert_eq!(filter.apply(&mut request).await, Some(FilterDecision::Abort));
        assert_eq!(filter.apply(&mut request).await, None);

        assert_eq!(request.aborts, 1);
        assert_eq!(request.continues, 0);
    }

    #[tokio::test]
    async fn test_apply_continues_allowed_request_once() {
        let filter = tracker_filter();
        let mut request = FakeRequest::new("https://site.example.com", "document");

        assert_eq!(filter.apply(&mut request).await, Some(FilterDecision::Continue));
        assert_eq!(filter.apply(&mut request).await, None);
        assert_eq!(request.continues, 1);
    }

    #[tokio::test]
    async fn test_failed_abort_fails_open() {
        let filter = tracker_filter();
        let mut request = FakeRequest::new("https://site.example.com/a.png", "image");
        request.abort_fails = true;

        assert_eq!(filter.apply(&mut request).await, Some(FilterDecision::Continue));
        assert_eq!(request.aborts, 0);
        assert_eq!(request.continues, 1);
    }
}
