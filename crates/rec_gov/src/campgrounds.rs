use std::collections::BTreeMap;

use campground_scan::{ScanError, Target};
use log::{debug, warn};

/// Listing URL prefix; the campground id is appended.
pub const DEFAULT_BASE_URL: &str = "https://www.recreation.gov/camping/campgrounds/";

/// Known campgrounds and the base URL their listings live under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampgroundDirectory {
    base_url: String,
    campgrounds: BTreeMap<String, u64>,
}

impl CampgroundDirectory {
    /// Creates an empty directory.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            campgrounds: BTreeMap::new(),
        }
    }

    /// Yosemite Valley and Tuolumne campgrounds.
    pub fn yosemite(base_url: impl Into<String>) -> Self {
        Self::new(base_url)
            .with_campground("Upper Pines", 232447)
            .with_campground("Tuolumne Meadows", 232448)
            .with_campground("North Pines", 232449)
            .with_campground("Lower Pines", 232450)
    }

    /// Parses a `{"Name": id}` object such as the contents of `sites.json`.
    pub fn from_json(base_url: impl Into<String>, json: &str) -> Result<Self, ScanError> {
        let campgrounds: BTreeMap<String, u64> = serde_json::from_str(json)
            .map_err(|e| ScanError::ConfigError(format!("Invalid campground map: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            campgrounds,
        })
    }

    /// Adds or replaces a campground.
    pub fn with_campground(mut self, name: impl Into<String>, id: u64) -> Self {
        self.campgrounds.insert(name.into(), id);
        self
    }

    /// Number of known campgrounds.
    pub fn len(&self) -> usize {
        self.campgrounds.len()
    }

    /// Whether no campground is known.
    pub fn is_empty(&self) -> bool {
        self.campgrounds.is_empty()
    }

    /// Listing URL for a campground id.
    pub fn campground_url(&self, id: u64) -> String {
        if self.base_url.ends_with('/') {
            format!("{}{}", self.base_url, id)
        } else {
            format!("{}/{}", self.base_url, id)
        }
    }

    /// Resolves a campground name (case-insensitive) or numeric id to a target.
    ///
    /// Unknown numeric ids are accepted as-is and named after the id.
    pub fn resolve(&self, site: &str) -> Result<Target, ScanError> {
        let site = site.trim();

        if let Ok(id) = site.parse::<u64>() {
            let name = self
                .campgrounds
                .iter()
                .find(|(_, known)| **known == id)
                .map(|(name, _)| name.clone())
                .unwrap_or_else(|| site.to_string());
            return Ok(Target::new(name, self.campground_url(id)));
        }

        self.campgrounds
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(site))
            .map(|(name, id)| Target::new(name.clone(), self.campground_url(*id)))
            .ok_or_else(|| ScanError::UnknownCampground(site.to_string()))
    }

    /// Resolves every entry, keeping configuration order and dropping duplicates.
    pub fn resolve_all<S: AsRef<str>>(&self, sites: &[S]) -> Result<Vec<Target>, ScanError> {
        let mut targets: Vec<Target> = Vec::with_capacity(sites.len());

        for site in sites {
            let target = self.resolve(site.as_ref())?;
            if targets.iter().any(|t| t.url == target.url) {
                warn!("Ignoring duplicate campground {}", target.name);
                continue;
            }
            debug!("Resolved {} to {}", site.as_ref(), target.url);
            targets.push(target);
        }

        if targets.is_empty() {
            return Err(ScanError::ConfigError(
                "At least one campground is required".to_string(),
            ));
        }
        Ok(targets)
    }
}

impl Default for CampgroundDirectory {
    fn default() -> Self {
        Self::yosemite(DEFAULT_BASE_URL)
    }
}
