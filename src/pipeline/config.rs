//! Pipeline configuration for the coordinator.
//!
//! This module describes the pipeline topology: the global target quantity,
//! the upstream stages with their consumption ratios and buffer capacities,
//! the production buffer, and the delivery batch size. Configuration can come
//! from defaults, environment variables, or a YAML file, and is always
//! validated before a coordinator is built.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use crate::error::ConfigError;

/// Name of the terminal stage in tallies and progress snapshots.
pub const DELIVERY_STAGE: &str = "delivery";

/// One upstream stage feeding the production stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Stage name, unique within the pipeline.
    pub name: String,
    /// Units of this input consumed per unit of product.
    pub ratio: u64,
    /// Capacity of the buffer between this stage and production.
    pub capacity: usize,
}

impl UpstreamConfig {
    /// Creates an upstream stage description.
    pub fn new(name: impl Into<String>, ratio: u64, capacity: usize) -> Self {
        Self {
            name: name.into(),
            ratio,
            capacity,
        }
    }
}

impl fmt::Display for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.ratio, self.capacity)
    }
}

/// Parses `name:ratio[:capacity]`. Capacity defaults to the ratio.
impl FromStr for UpstreamConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: "upstream".to_string(),
            message,
        };

        let parts: Vec<&str> = s.trim().split(':').map(str::trim).collect();
        let (name, ratio, capacity) = match parts.as_slice() {
            [name, ratio] => (*name, *ratio, None),
            [name, ratio, capacity] => (*name, *ratio, Some(*capacity)),
            _ => {
                return Err(invalid(format!(
                    "expected 'name:ratio[:capacity]', got '{}'",
                    s
                )))
            }
        };

        let ratio: u64 = ratio
            .parse()
            .map_err(|_| invalid(format!("could not parse ratio '{}'", ratio)))?;
        let capacity = match capacity {
            Some(c) => c
                .parse()
                .map_err(|_| invalid(format!("could not parse capacity '{}'", c)))?,
            None => usize::try_from(ratio)
                .map_err(|_| invalid(format!("ratio {} does not fit a capacity", ratio)))?,
        };

        Ok(Self::new(name, ratio, capacity))
    }
}

/// Configuration for the pipeline coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of finished products the run must produce.
    pub target_quantity: u64,
    /// Upstream stages feeding production, in draining order.
    pub upstream: Vec<UpstreamConfig>,
    /// Name of the production stage.
    pub product_name: String,
    /// Capacity of the buffer between production and delivery.
    pub product_capacity: usize,
    /// Products withdrawn per delivery.
    pub batch_size: u64,
    /// How often to log progress while running; `None` disables it.
    #[serde(with = "optional_millis")]
    pub progress_interval: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_quantity: 100_000,
            upstream: vec![
                UpstreamConfig::new("milk", 2, 200),
                UpstreamConfig::new("ferment", 1, 100),
            ],
            product_name: "cheese".to_string(),
            product_capacity: 1000,
            batch_size: 100,
            progress_interval: None,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PIPELINE_TARGET_QUANTITY`: Products to make (default: 100000)
    /// - `PIPELINE_BATCH_SIZE`: Products per delivery (default: 100)
    /// - `PIPELINE_PRODUCT_NAME`: Production stage name (default: cheese)
    /// - `PIPELINE_PRODUCT_CAPACITY`: Production buffer capacity (default: 1000)
    /// - `PIPELINE_UPSTREAM`: Comma-separated `name:ratio[:capacity]` list
    ///   (default: `milk:2:200,ferment:1:100`)
    /// - `PIPELINE_PROGRESS_INTERVAL_MS`: Progress log interval, 0 disables (default: off)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable cannot be parsed or the resulting
    /// configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the same variables as [`from_env`](Self::from_env) without
    /// validating, so callers can apply further overrides first.
    pub fn load_env() -> Result<Self, ConfigError> {
        Self::load_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup, using the same keys
    /// as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::load_lookup(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`from_lookup`](Self::from_lookup), but only parses values.
    pub fn load_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("PIPELINE_TARGET_QUANTITY") {
            config.target_quantity = parse_env_value(&val, "PIPELINE_TARGET_QUANTITY")?;
        }

        if let Some(val) = lookup("PIPELINE_BATCH_SIZE") {
            config.batch_size = parse_env_value(&val, "PIPELINE_BATCH_SIZE")?;
        }

        if let Some(val) = lookup("PIPELINE_PRODUCT_NAME") {
            config.product_name = val;
        }

        if let Some(val) = lookup("PIPELINE_PRODUCT_CAPACITY") {
            config.product_capacity = parse_env_value(&val, "PIPELINE_PRODUCT_CAPACITY")?;
        }

        if let Some(val) = lookup("PIPELINE_UPSTREAM") {
            config.upstream = parse_upstream_list(&val)?;
        }

        if let Some(val) = lookup("PIPELINE_PROGRESS_INTERVAL_MS") {
            let ms: u64 = parse_env_value(&val, "PIPELINE_PROGRESS_INTERVAL_MS")?;
            config.progress_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }

        Ok(config)
    }

    /// Loads configuration from a YAML file. Missing fields take defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::load_yaml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a YAML file without validating the result.
    pub fn load_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for zero quantities or capacities, duplicate
    /// names, overflowing quotas, or a target quantity that is not an exact
    /// multiple of the batch size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_quantity == 0 {
            return Err(ConfigError::ValidationFailed(
                "target_quantity must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.target_quantity % self.batch_size != 0 {
            return Err(ConfigError::UnsatisfiableQuota {
                quantity: self.target_quantity,
                batch_size: self.batch_size,
            });
        }

        if self.product_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        if self.product_name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "product_name cannot be empty".to_string(),
            ));
        }

        if self.upstream.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one upstream stage is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        names.insert(self.product_name.as_str());
        names.insert(DELIVERY_STAGE);

        for stage in &self.upstream {
            if stage.name.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "upstream stage name cannot be empty".to_string(),
                ));
            }
            if !names.insert(stage.name.as_str()) {
                return Err(ConfigError::DuplicateStage(stage.name.clone()));
            }
            if stage.ratio == 0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "ratio for stage '{}' must be greater than 0",
                    stage.name
                )));
            }
            if stage.capacity == 0 {
                return Err(ConfigError::ZeroCapacity);
            }
            self.quota_for(stage)?;
        }

        Ok(())
    }

    /// Units upstream stage `stage` must produce over one run.
    pub fn quota_for(&self, stage: &UpstreamConfig) -> Result<u64, ConfigError> {
        self.target_quantity
            .checked_mul(stage.ratio)
            .ok_or_else(|| ConfigError::QuotaOverflow {
                stage: stage.name.clone(),
                quantity: self.target_quantity,
                ratio: stage.ratio,
            })
    }

    /// Number of deliveries in one run.
    pub fn delivery_quota(&self) -> u64 {
        self.target_quantity / self.batch_size.max(1)
    }

    /// Builder method to set the target quantity.
    pub fn with_target_quantity(mut self, quantity: u64) -> Self {
        self.target_quantity = quantity;
        self
    }

    /// Builder method to replace the upstream stages.
    pub fn with_upstream(mut self, upstream: Vec<UpstreamConfig>) -> Self {
        self.upstream = upstream;
        self
    }

    /// Builder method to set the production stage name.
    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }

    /// Builder method to set the production buffer capacity.
    pub fn with_product_capacity(mut self, capacity: usize) -> Self {
        self.product_capacity = capacity;
        self
    }

    /// Builder method to set the delivery batch size.
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder method to enable periodic progress logging.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = Some(interval);
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse a comma-separated list of upstream stage descriptions.
fn parse_upstream_list(value: &str) -> Result<Vec<UpstreamConfig>, ConfigError> {
    value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .collect()
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let ms: Option<u64> = Option::deserialize(d)?;
        Ok(ms.filter(|ms| *ms > 0).map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.target_quantity, 100_000);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.product_name, "cheese");
        assert_eq!(config.product_capacity, 1000);
        assert_eq!(config.upstream.len(), 2);
        assert_eq!(config.upstream[0], UpstreamConfig::new("milk", 2, 200));
        assert_eq!(config.upstream[1], UpstreamConfig::new("ferment", 1, 100));
        assert!(config.progress_interval.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_quotas() {
        let config = PipelineConfig::default();
        assert_eq!(config.quota_for(&config.upstream[0]).ok(), Some(200_000));
        assert_eq!(config.quota_for(&config.upstream[1]).ok(), Some(100_000));
        assert_eq!(config.delivery_quota(), 1000);
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_target_quantity(500)
            .with_upstream(vec![UpstreamConfig::new("grain", 3, 9)])
            .with_product_name("bread")
            .with_product_capacity(20)
            .with_batch_size(50)
            .with_progress_interval(Duration::from_millis(250));

        assert_eq!(config.target_quantity, 500);
        assert_eq!(config.upstream, vec![UpstreamConfig::new("grain", 3, 9)]);
        assert_eq!(config.product_name, "bread");
        assert_eq!(config.product_capacity, 20);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.progress_interval, Some(Duration::from_millis(250)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_remainder_batches() {
        let config = PipelineConfig::default().with_target_quantity(150);
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::UnsatisfiableQuota {
                quantity: 150,
                batch_size: 100
            })
        ));
    }

    #[test]
    fn test_validation_zero_values() {
        let result = PipelineConfig::default().with_target_quantity(0).validate();
        assert!(result.unwrap_err().to_string().contains("target_quantity"));

        let result = PipelineConfig::default().with_batch_size(0).validate();
        assert!(result.unwrap_err().to_string().contains("batch_size"));

        let result = PipelineConfig::default().with_product_capacity(0).validate();
        assert!(matches!(result, Err(ConfigError::ZeroCapacity)));

        let result = PipelineConfig::default()
            .with_upstream(vec![UpstreamConfig::new("milk", 0, 10)])
            .validate();
        assert!(result.unwrap_err().to_string().contains("ratio"));

        let result = PipelineConfig::default()
            .with_upstream(vec![UpstreamConfig::new("milk", 2, 0)])
            .validate();
        assert!(matches!(result, Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn test_validation_stage_names() {
        let result = PipelineConfig::default().with_upstream(vec![]).validate();
        assert!(result.unwrap_err().to_string().contains("upstream"));

        let result = PipelineConfig::default()
            .with_upstream(vec![
                UpstreamConfig::new("milk", 2, 10),
                UpstreamConfig::new("milk", 1, 10),
            ])
            .validate();
        assert!(matches!(result, Err(ConfigError::DuplicateStage(name)) if name == "milk"));

        let result = PipelineConfig::default()
            .with_upstream(vec![UpstreamConfig::new("cheese", 1, 10)])
            .validate();
        assert!(matches!(result, Err(ConfigError::DuplicateStage(_))));

        let result = PipelineConfig::default()
            .with_upstream(vec![UpstreamConfig::new(DELIVERY_STAGE, 1, 10)])
            .validate();
        assert!(matches!(result, Err(ConfigError::DuplicateStage(_))));

        let result = PipelineConfig::default().with_product_name(" ").validate();
        assert!(result.unwrap_err().to_string().contains("product_name"));
    }

    #[test]
    fn test_validation_quota_overflow() {
        let config = PipelineConfig::default()
            .with_target_quantity(u64::MAX - (u64::MAX % 100))
            .with_upstream(vec![UpstreamConfig::new("milk", 2, 10)]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::QuotaOverflow { .. })
        ));
    }

    #[test]
    fn test_upstream_from_str() {
        let stage: UpstreamConfig = "milk:2:200".parse().expect("should parse");
        assert_eq!(stage, UpstreamConfig::new("milk", 2, 200));

        let stage: UpstreamConfig = " ferment : 3 ".parse().expect("should parse");
        assert_eq!(stage, UpstreamConfig::new("ferment", 3, 3));

        assert!("milk".parse::<UpstreamConfig>().is_err());
        assert!("milk:two".parse::<UpstreamConfig>().is_err());
        assert!("milk:2:big".parse::<UpstreamConfig>().is_err());
        assert!("a:1:2:3".parse::<UpstreamConfig>().is_err());

        assert_eq!(UpstreamConfig::new("milk", 2, 200).to_string(), "milk:2:200");
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = PipelineConfig::from_lookup(|_| None).expect("defaults are valid");
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("PIPELINE_TARGET_QUANTITY", "1000"),
            ("PIPELINE_BATCH_SIZE", "10"),
            ("PIPELINE_PRODUCT_NAME", "yogurt"),
            ("PIPELINE_PRODUCT_CAPACITY", "50"),
            ("PIPELINE_UPSTREAM", "milk:3:30, culture:1"),
            ("PIPELINE_PROGRESS_INTERVAL_MS", "500"),
        ]))
        .expect("valid overrides");

        assert_eq!(config.target_quantity, 1000);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.product_name, "yogurt");
        assert_eq!(config.product_capacity, 50);
        assert_eq!(
            config.upstream,
            vec![
                UpstreamConfig::new("milk", 3, 30),
                UpstreamConfig::new("culture", 1, 1)
            ]
        );
        assert_eq!(config.progress_interval, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_from_lookup_invalid_values() {
        let result =
            PipelineConfig::from_lookup(lookup_from(&[("PIPELINE_BATCH_SIZE", "lots")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { key, .. }) if key == "PIPELINE_BATCH_SIZE"));

        let result =
            PipelineConfig::from_lookup(lookup_from(&[("PIPELINE_TARGET_QUANTITY", "1234")]));
        assert!(matches!(result, Err(ConfigError::UnsatisfiableQuota { .. })));

        let result = PipelineConfig::from_lookup(lookup_from(&[(
            "PIPELINE_PROGRESS_INTERVAL_MS",
            "0",
        )]))
        .expect("zero interval disables progress");
        assert!(result.progress_interval.is_none());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "target_quantity: 200\nbatch_size: 20\nupstream:\n  - name: milk\n    ratio: 2\n    capacity: 4\nprogress_interval: 100"
        )
        .expect("write yaml");

        let config = PipelineConfig::from_yaml_file(file.path()).expect("valid yaml");
        assert_eq!(config.target_quantity, 200);
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.upstream, vec![UpstreamConfig::new("milk", 2, 4)]);
        assert_eq!(config.product_name, "cheese");
        assert_eq!(config.progress_interval, Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_from_yaml_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "target_quantity: 150").expect("write yaml");
        let result = PipelineConfig::from_yaml_file(file.path());
        assert!(matches!(result, Err(ConfigError::UnsatisfiableQuota { .. })));

        let result = PipelineConfig::from_yaml_file("/nonexistent/boundline.yaml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_skips_validation() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "target_quantity: 150").expect("write yaml");
        let config = PipelineConfig::load_yaml_file(file.path()).expect("parses");
        assert_eq!(config.target_quantity, 150);
        assert!(config.validate().is_err());

        let config =
            PipelineConfig::load_lookup(lookup_from(&[("PIPELINE_TARGET_QUANTITY", "1234")]))
                .expect("parses");
        assert_eq!(config.target_quantity, 1234);
        assert!(config.validate().is_err());

        let result =
            PipelineConfig::load_lookup(lookup_from(&[("PIPELINE_BATCH_SIZE", "lots")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_yaml_roundtrip_keeps_interval() {
        let config = PipelineConfig::default().with_progress_interval(Duration::from_secs(2));
        let yaml = serde_yaml::to_string(&config).expect("serialize");
        assert!(yaml.contains("progress_interval: 2000"));
        let parsed: PipelineConfig = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(parsed, config);
    }
}
