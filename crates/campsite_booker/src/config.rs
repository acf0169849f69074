//! Startup configuration from the environment and optional JSON files.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use campground_scan::{
    BookingProfile, BrowserSettings, Credentials, DateWindow, ExecutorConfig, FilterRules,
    OrderDetails, PaymentDetails, ProbeSettings, RequestFilter, ScanError, SiteSelectors,
    StepTimeouts, Target,
};
use chrono::NaiveDate;
use rec_gov::{CampgroundDirectory, DEFAULT_BASE_URL, recreation_gov_selectors};
use serde::Deserialize;
use validator::Validate;

const DEFAULT_BLOCKED_TYPES: &str = "image,media,font";
const DEFAULT_BLOCKED_URLS: &str = "google-analytics.com,googletagmanager.com,doubleclick.net,\
                                    facebook.net,hotjar.com";

/// Where notifications go besides the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationChannels {
    /// ntfy server and topic
    pub push: Option<(String, String)>,
    /// SNS topic ARN or phone number
    pub sns_target: Option<String>,
    /// SES sender and recipient
    pub ses: Option<(String, String)>,
}

/// Everything the booker needs, loaded once at startup.
#[derive(Debug)]
pub struct AppConfig {
    /// Campgrounds to watch, in preference order
    pub targets: Vec<Target>,
    /// Stay to book
    pub window: DateWindow,
    /// Credentials, payment and order details
    pub profile: BookingProfile,
    /// Resource types and URL fragments blocked in every session
    pub filter_rules: FilterRules,
    /// Page controls of the reservation site
    pub selectors: SiteSelectors,
    /// Per-step wait limits
    pub timeouts: StepTimeouts,
    /// Chromium launch settings
    pub browser: BrowserSettings,
    /// Polling loop settings
    pub executor: ExecutorConfig,
    /// Where run results are sent
    pub channels: NotificationChannels,
}

#[derive(Debug, Deserialize)]
struct DatesFile {
    #[serde(alias = "startDate", alias = "START_DATE")]
    start: String,
    #[serde(alias = "endDate", alias = "END_DATE")]
    end: String,
}

impl AppConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ScanError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ScanError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let config_dir = vars.optional("CONFIG_DIR").map(PathBuf::from);
        let base_url = vars
            .optional("URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let directory = match read_config_file(config_dir.as_deref(), "sites.json")? {
            Some(json) => CampgroundDirectory::from_json(base_url, &json)?,
            None => CampgroundDirectory::yosemite(base_url),
        };
        let targets = directory.resolve_all(&parse_sites(&vars.required("SITES")?))?;

        let window = load_window(&vars, config_dir.as_deref())?;

        let profile = BookingProfile {
            credentials: Credentials {
                username: vars.required("USER_NAME")?,
                password: vars.required("PASSWORD")?,
            },
            payment: PaymentDetails {
                cardholder_name: vars.required("NAME")?,
                card_number: vars.required("CCN")?,
                expiry_month: vars.required("EXP_MONTH")?,
                expiry_year: vars.required("EXP_YEAR")?,
                security_code: vars.required("CVC")?,
            },
            order: OrderDetails {
                party_size: vars.parse("PARTY_SIZE", OrderDetails::default().party_size)?,
                vehicle_count: vars.parse("VEHICLE_COUNT", OrderDetails::default().vehicle_count)?,
            },
        };
        profile.validate()?;

        let filter_rules = FilterRules::new(
            parse_list(&vars.or("BLOCKED_RESOURCE_TYPES", DEFAULT_BLOCKED_TYPES)),
            parse_list(&vars.or("BLOCKED_URL_SUBSTRINGS", DEFAULT_BLOCKED_URLS)),
        );

        let selectors = match read_config_file(config_dir.as_deref(), "selectors.json")? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| ScanError::ConfigError(format!("Invalid selectors.json: {}", e)))?,
            None => recreation_gov_selectors(),
        };

        let browser = BrowserSettings {
            executable: vars.optional("CHROMIUM_PATH").map(PathBuf::from),
            headless: vars.flag("HEADLESS", true)?,
            ..BrowserSettings::default()
        };

        let max_cycles = match vars.optional("MAX_CYCLES") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(0) | Err(_) => {
                    return Err(ScanError::ConfigError(format!(
                        "MAX_CYCLES must be a positive integer, got {}",
                        raw
                    )));
                }
                Ok(n) => Some(n),
            },
            None => None,
        };

        let executor = ExecutorConfig {
            poll_interval: Duration::from_secs(vars.parse("POLL_INTERVAL_SECS", 60)?),
            poll_jitter: Duration::from_secs(vars.parse("POLL_JITTER_SECS", 15)?),
            max_cycles,
            screenshot_path: PathBuf::from(vars.or("SCREENSHOT_PATH", "testresult.png")),
            notify_no_inventory: vars.flag("NOTIFY_NO_INVENTORY", false)?,
        };

        let channels = load_channels(&vars)?;

        Ok(Self {
            targets,
            window,
            profile,
            filter_rules,
            selectors,
            timeouts: StepTimeouts::default(),
            browser,
            executor,
            channels,
        })
    }

    /// Settings shared by every probe of a run.
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            selectors: Arc::new(self.selectors.clone()),
            timeouts: self.timeouts,
            window: self.window,
            filter: Arc::new(RequestFilter::new(&self.filter_rules)),
        }
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ScanError> {
        self.optional(key)
            .ok_or_else(|| ScanError::ConfigError(format!("{} must be set", key)))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, ScanError> {
        match self.optional(key) {
            Some(raw) => raw
                .parse()
                .map_err(|_| ScanError::ConfigError(format!("Invalid {}: {}", key, raw))),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ScanError> {
        match self.optional(key) {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| ScanError::ConfigError(format!("Invalid {}: {}", key, raw))),
            None => Ok(default),
        }
    }
}

fn load_window<F>(vars: &Vars<F>, config_dir: Option<&Path>) -> Result<DateWindow, ScanError>
where
    F: Fn(&str) -> Option<String>,
{
    let from_file = match read_config_file(config_dir, "dates.json")? {
        Some(json) => Some(
            serde_json::from_str::<DatesFile>(&json)
                .map_err(|e| ScanError::ConfigError(format!("Invalid dates.json: {}", e)))?,
        ),
        None => None,
    };

    let start = vars
        .optional("START_DATE")
        .or_else(|| from_file.as_ref().map(|f| f.start.clone()))
        .ok_or_else(|| ScanError::ConfigError("START_DATE must be set".to_string()))?;
    let end = vars
        .optional("END_DATE")
        .or_else(|| from_file.as_ref().map(|f| f.end.clone()))
        .ok_or_else(|| ScanError::ConfigError("END_DATE must be set".to_string()))?;

    DateWindow::new(parse_date(&start)?, parse_date(&end)?)
}

fn load_channels<F>(vars: &Vars<F>) -> Result<NotificationChannels, ScanError>
where
    F: Fn(&str) -> Option<String>,
{
    let push = match vars.optional("NTFY_URL") {
        Some(url) => {
            let (server, topic) = url
                .trim_end_matches('/')
                .rsplit_once('/')
                .filter(|(server, topic)| server.contains("://") && !topic.is_empty())
                .ok_or_else(|| {
                    ScanError::ConfigError(format!(
                        "NTFY_URL must look like https://ntfy.sh/<topic>, got {}",
                        url
                    ))
                })?;
            Some((server.to_string(), topic.to_string()))
        }
        None => None,
    };

    let ses = match (vars.optional("SES_FROM"), vars.optional("SES_TO")) {
        (Some(from), Some(to)) => Some((from, to)),
        (None, None) => None,
        _ => {
            return Err(ScanError::ConfigError(
                "SES_FROM and SES_TO must be set together".to_string(),
            ));
        }
    };

    Ok(NotificationChannels {
        push,
        sns_target: vars.optional("SNS_TARGET"),
        ses,
    })
}

fn read_config_file(dir: Option<&Path>, name: &str) -> Result<Option<String>, ScanError> {
    let Some(dir) = dir else {
        return Ok(None);
    };

    let path = dir.join(name);
    if !path.exists() {
        return Ok(None);
    }

    log::info!("📄 Loading {}", path.display());
    fs::read_to_string(&path)
        .map(Some)
        .map_err(|e| ScanError::ConfigError(format!("Failed to read {}: {}", path.display(), e)))
}

/// Accepts `YYYY-MM-DD` or `MM/DD/YYYY`.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ScanError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .map_err(|_| ScanError::ConfigError(format!("Invalid date: {}", raw)))
}

/// Campground entries are comma-separated when any comma is present, else whitespace-separated.
pub fn parse_sites(raw: &str) -> Vec<String> {
    if raw.contains(',') {
        parse_list(raw)
    } else {
        raw.split_whitespace().map(str::to_string).collect()
    }
}

/// Comma-separated list with blanks dropped.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// `true/false`, `1/0`, `yes/no`, `on/off`, case-insensitive.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
