use crate::{
    ConfigError, Encoding, Fields, Method, Percentile, RampProfile, RequestTemplate, Stage,
    DEFAULT_EXPECTED_STATUS, DEFAULT_GRACE_PERIOD, DEFAULT_PERCENTILES, DEFAULT_POLL_INTERVAL,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_THINK_TIME, MAX_DURATION,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{debug, info};
use url::Url;

/// What a call must return to count as a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expectation {
    pub status: u16,
}

impl Default for Expectation {
    fn default() -> Self {
        Self {
            status: DEFAULT_EXPECTED_STATUS,
        }
    }
}

impl Expectation {
    pub fn status(status: u16) -> Self {
        Self { status }
    }
}

/// Validated, immutable description of one load test.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    name: String,
    base_url: Url,
    profile: RampProfile,
    request: RequestTemplate,
    expect: Expectation,
    think_time: Duration,
    think_jitter: Duration,
    timeout: Duration,
    grace_period: Duration,
    poll_interval: Duration,
    report_interval: Option<Duration>,
    percentiles: Vec<Percentile>,
}

impl ScenarioConfig {
    pub fn new(
        name: &str,
        base_url: &str,
        profile: RampProfile,
        request: RequestTemplate,
    ) -> Result<Self, ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyScenarioName);
        }
        request.validate(name)?;

        Ok(Self {
            name: name.to_string(),
            base_url: parse_base_url(base_url)?,
            profile,
            request,
            expect: Expectation::default(),
            think_time: DEFAULT_THINK_TIME,
            think_jitter: Duration::ZERO,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            report_interval: None,
            percentiles: default_percentiles(),
        })
    }

    pub fn expect(mut self, expect: Expectation) -> Result<Self, ConfigError> {
        check_status(&self.name, expect.status)?;
        self.expect = expect;
        Ok(self)
    }

    pub fn think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time.min(MAX_DURATION);
        self
    }

    /// Upper bound of the uniform random delay added to every think-time pause.
    pub fn think_jitter(mut self, jitter: Duration) -> Self {
        self.think_jitter = jitter.min(MAX_DURATION);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(MAX_DURATION);
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period.min(MAX_DURATION);
        self
    }

    /// Scheduler reconciliation cadence. Floored at one millisecond. Like every
    /// duration setter here, capped at [`MAX_DURATION`].
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.clamp(Duration::from_millis(1), MAX_DURATION);
        self
    }

    pub fn report_interval(mut self, report_interval: Option<Duration>) -> Self {
        self.report_interval = report_interval.map(|interval| interval.min(MAX_DURATION));
        self
    }

    pub fn percentiles(mut self, percentiles: Vec<Percentile>) -> Self {
        self.percentiles = percentiles;
        self
    }

    pub fn set_base_url(&mut self, base_url: &str) -> Result<(), ConfigError> {
        self.base_url = parse_base_url(base_url)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn profile(&self) -> &RampProfile {
        &self.profile
    }

    pub fn request(&self) -> &RequestTemplate {
        &self.request
    }

    pub fn expectation(&self) -> Expectation {
        self.expect
    }

    pub fn think(&self) -> (Duration, Duration) {
        (self.think_time, self.think_jitter)
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn grace(&self) -> Duration {
        self.grace_period
    }

    pub fn poll(&self) -> Duration {
        self.poll_interval
    }

    pub fn report_every(&self) -> Option<Duration> {
        self.report_interval
    }

    pub fn reported_percentiles(&self) -> &[Percentile] {
        &self.percentiles
    }
}

/// A validated set of scenarios with unique names.
#[derive(Debug, Clone)]
pub struct RunConfig {
    scenarios: Vec<ScenarioConfig>,
}

impl RunConfig {
    pub fn new(scenarios: Vec<ScenarioConfig>) -> Result<Self, ConfigError> {
        if scenarios.is_empty() {
            return Err(ConfigError::NoScenarios);
        }
        let mut seen = HashSet::new();
        for scenario in &scenarios {
            if !seen.insert(scenario.name.as_str()) {
                return Err(ConfigError::DuplicateScenario(scenario.name.clone()));
            }
        }
        Ok(Self { scenarios })
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        info!(
            "Loaded {} scenario(s) from {}",
            config.scenarios.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let raw: RawRunConfig = serde_json::from_str(content)?;
        raw.validate()
    }

    pub fn scenarios(&self) -> &[ScenarioConfig] {
        &self.scenarios
    }

    pub fn into_scenarios(self) -> Vec<ScenarioConfig> {
        self.scenarios
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioConfig> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Keep only the named scenarios; an empty selection keeps everything.
    /// Fails with [`ConfigError::NoScenarios`] if nothing matches.
    pub fn select(mut self, names: &[String]) -> Result<Self, ConfigError> {
        if !names.is_empty() {
            self.scenarios.retain(|s| names.contains(&s.name));
        }
        Self::new(self.scenarios)
    }

    pub fn override_base_url(&mut self, base_url: &str) -> Result<(), ConfigError> {
        for scenario in &mut self.scenarios {
            scenario.set_base_url(base_url)?;
        }
        Ok(())
    }
}

fn default_percentiles() -> Vec<Percentile> {
    DEFAULT_PERCENTILES
        .iter()
        .filter_map(|&q| Percentile::new(q))
        .collect()
}

fn parse_base_url(base_url: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: base_url.to_string(),
        reason,
    };
    let url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("not a base url".to_string()));
    }
    Ok(url)
}

fn check_status(scenario: &str, status: u16) -> Result<(), ConfigError> {
    if (100..=599).contains(&status) {
        Ok(())
    } else {
        Err(ConfigError::InvalidStatus {
            scenario: scenario.to_string(),
            status,
        })
    }
}

/* Raw file representation */

/// Either a number of seconds or a human-readable duration such as `"1m30s"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(f64),
    Text(String),
}

impl RawDuration {
    fn display(&self) -> String {
        match self {
            RawDuration::Seconds(s) => s.to_string(),
            RawDuration::Text(t) => t.clone(),
        }
    }

    /// Signed seconds, so negative values can be reported as such.
    fn signed_secs(&self, field: &str) -> Result<f64, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidDuration {
            field: field.to_string(),
            value: self.display(),
            reason,
        };

        match self {
            RawDuration::Seconds(s) if s.is_finite() => Ok(*s),
            RawDuration::Seconds(_) => Err(invalid("not a finite number".to_string())),
            RawDuration::Text(text) => {
                let text = text.trim();
                let (sign, body) = match text.strip_prefix('-') {
                    Some(rest) => (-1., rest.trim()),
                    None => (1., text),
                };
                humantime::parse_duration(body)
                    .map(|d| sign * d.as_secs_f64())
                    .map_err(|e| invalid(e.to_string()))
            }
        }
    }

    fn resolve(&self, field: &str) -> Result<Duration, ConfigError> {
        let secs = self.signed_secs(field)?;
        if secs < 0. {
            return Err(ConfigError::InvalidDuration {
                field: field.to_string(),
                value: self.display(),
                reason: "must not be negative".to_string(),
            });
        }
        let duration =
            Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidDuration {
                field: field.to_string(),
                value: self.display(),
                reason: e.to_string(),
            })?;
        check_schedulable(field, &self.display(), duration)?;
        Ok(duration)
    }
}

/// Reject durations the run could not add to the monotonic clock.
fn check_schedulable(field: &str, value: &str, duration: Duration) -> Result<(), ConfigError> {
    let fits = duration <= MAX_DURATION && std::time::Instant::now().checked_add(duration).is_some();
    if fits {
        Ok(())
    } else {
        Err(ConfigError::InvalidDuration {
            field: field.to_string(),
            value: value.to_string(),
            reason: format!("longer than {}", humantime::format_duration(MAX_DURATION)),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRunConfig {
    base_url: String,
    #[serde(default)]
    defaults: RawTuning,
    scenarios: Vec<RawScenario>,
}

/// Knobs settable globally under `defaults` and per scenario.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTuning {
    think_time: Option<RawDuration>,
    think_jitter: Option<RawDuration>,
    timeout: Option<RawDuration>,
    grace_period: Option<RawDuration>,
    poll_interval: Option<RawDuration>,
    report_interval: Option<RawDuration>,
    percentiles: Option<Vec<f64>>,
}

impl RawTuning {
    const FIELDS: [&'static str; 7] = [
        "think_time",
        "think_jitter",
        "timeout",
        "grace_period",
        "poll_interval",
        "report_interval",
        "percentiles",
    ];

    /// Tuning from the keys a scenario object left over after its own fields.
    fn from_scenario_keys(
        scenario: &str,
        keys: serde_json::Map<String, serde_json::Value>,
    ) -> Result<RawTuning, ConfigError> {
        if let Some(field) = keys.keys().find(|key| !Self::FIELDS.contains(&key.as_str())) {
            return Err(ConfigError::UnknownField {
                scenario: scenario.to_string(),
                field: field.clone(),
            });
        }
        Ok(serde_json::from_value(serde_json::Value::Object(keys))?)
    }

    fn or(self, fallback: &RawTuning) -> RawTuning {
        RawTuning {
            think_time: self.think_time.or_else(|| fallback.think_time.clone()),
            think_jitter: self.think_jitter.or_else(|| fallback.think_jitter.clone()),
            timeout: self.timeout.or_else(|| fallback.timeout.clone()),
            grace_period: self.grace_period.or_else(|| fallback.grace_period.clone()),
            poll_interval: self.poll_interval.or_else(|| fallback.poll_interval.clone()),
            report_interval: self.report_interval.or_else(|| fallback.report_interval.clone()),
            percentiles: self.percentiles.or_else(|| fallback.percentiles.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawScenario {
    name: String,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    start_target: Option<i64>,
    stages: Vec<RawStage>,
    request: RawRequest,
    #[serde(default)]
    expect: RawExpect,
    /// Per-scenario tuning, plus anything misspelled.
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStage {
    duration: RawDuration,
    target: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRequest {
    method: Method,
    path: String,
    #[serde(default)]
    encoding: Option<Encoding>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    fields: RawFields,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFields {
    query: Option<OneOrMany>,
    lat: Option<f64>,
    lon: Option<f64>,
    top_k: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExpect {
    status: Option<u16>,
}

impl RawRunConfig {
    fn validate(self) -> Result<RunConfig, ConfigError> {
        let RawRunConfig {
            base_url,
            defaults,
            scenarios,
        } = self;

        let scenarios = scenarios
            .into_iter()
            .map(|raw| raw.validate(&base_url, &defaults))
            .collect::<Result<Vec<_>, _>>()?;

        RunConfig::new(scenarios)
    }
}

impl RawScenario {
    fn validate(self, base_url: &str, defaults: &RawTuning) -> Result<ScenarioConfig, ConfigError> {
        let name = self.name;
        let tuning = RawTuning::from_scenario_keys(&name, self.rest)?.or(defaults);
        let profile = validate_profile(&name, self.start_target, &self.stages)?;
        let request = self.request.validate(&name)?;
        let base_url = self.base_url.as_deref().unwrap_or(base_url);

        let mut config = ScenarioConfig::new(&name, base_url, profile, request)?;

        if let Some(status) = self.expect.status {
            config = config.expect(Expectation::status(status))?;
        }

        let field = |f: &str| format!("{name}.{f}");

        if let Some(d) = &tuning.think_time {
            config.think_time = d.resolve(&field("think_time"))?;
        }
        if let Some(d) = &tuning.think_jitter {
            config.think_jitter = d.resolve(&field("think_jitter"))?;
        }
        if let Some(d) = &tuning.timeout {
            config.timeout = d.resolve(&field("timeout"))?;
        }
        if let Some(d) = &tuning.grace_period {
            config.grace_period = d.resolve(&field("grace_period"))?;
        }
        if let Some(d) = &tuning.poll_interval {
            let interval = d.resolve(&field("poll_interval"))?;
            if interval.is_zero() {
                return Err(ConfigError::ZeroPollInterval {
                    scenario: name.clone(),
                    interval,
                });
            }
            config.poll_interval = interval;
        }
        if let Some(d) = &tuning.report_interval {
            let interval = d.resolve(&field("report_interval"))?;
            config.report_interval = (!interval.is_zero()).then_some(interval);
        }
        if let Some(percentiles) = &tuning.percentiles {
            config.percentiles = percentiles
                .iter()
                .map(|&q| Percentile::new(q).ok_or(ConfigError::InvalidPercentile(q)))
                .collect::<Result<_, _>>()?;
        }

        debug!("Validated scenario {} with profile {:?}", config.name, config.profile);
        Ok(config)
    }
}

fn validate_profile(
    scenario: &str,
    start_target: Option<i64>,
    raw_stages: &[RawStage],
) -> Result<RampProfile, ConfigError> {
    let mut stages = Vec::with_capacity(raw_stages.len());

    for (idx, raw) in raw_stages.iter().enumerate() {
        let field = format!("{scenario}.stages[{idx}].duration");
        let seconds = raw.duration.signed_secs(&field)?;
        if seconds < 0. {
            return Err(ConfigError::NegativeDuration {
                scenario: scenario.to_string(),
                stage: idx,
                seconds,
            });
        }
        let duration = raw.duration.resolve(&field)?;

        if raw.target < 0 {
            return Err(ConfigError::NegativeTarget {
                scenario: scenario.to_string(),
                stage: idx,
                target: raw.target,
            });
        }
        let target = to_target(scenario, raw.target)?;

        stages.push(Stage::new(duration, target));
    }

    // A lone stage holds its level; multi-stage profiles ramp up from zero.
    let start_target = match (start_target, stages.as_slice()) {
        (Some(start), _) if start < 0 => {
            return Err(ConfigError::NegativeTarget {
                scenario: scenario.to_string(),
                stage: 0,
                target: start,
            })
        }
        (Some(start), _) => to_target(scenario, start)?,
        (None, [only]) => only.target,
        (None, _) => 0,
    };

    let profile = RampProfile::new(start_target, stages)
        .ok_or_else(|| ConfigError::EmptyProfile(scenario.to_string()))?;

    let field = format!("{scenario}.stages");
    let total = profile
        .checked_total_duration()
        .ok_or_else(|| ConfigError::InvalidDuration {
            field: field.clone(),
            value: "sum of stage durations".to_string(),
            reason: "overflows".to_string(),
        })?;
    check_schedulable(&field, &humantime::format_duration(total).to_string(), total)?;
    Ok(profile)
}

fn to_target(scenario: &str, target: i64) -> Result<u32, ConfigError> {
    u32::try_from(target).map_err(|_| ConfigError::TargetOutOfRange {
        scenario: scenario.to_string(),
        target,
    })
}

impl RawRequest {
    fn validate(self, scenario: &str) -> Result<RequestTemplate, ConfigError> {
        let queries = match self.fields.query {
            None => vec![],
            Some(OneOrMany::One(query)) => vec![query],
            Some(OneOrMany::Many(queries)) if queries.is_empty() => {
                return Err(ConfigError::InvalidTemplate {
                    scenario: scenario.to_string(),
                    reason: "query pool is empty".to_string(),
                })
            }
            Some(OneOrMany::Many(queries)) => queries,
        };

        let mut template = RequestTemplate::new(self.method, &self.path).with_fields(Fields {
            queries,
            lat: self.fields.lat,
            lon: self.fields.lon,
            top_k: self.fields.top_k,
        });
        if let Some(encoding) = self.encoding {
            template = template.encoding(encoding);
        }
        for (name, value) in &self.headers {
            template = template.header(name, value);
        }

        template.validate(scenario)?;
        Ok(template)
    }
}
