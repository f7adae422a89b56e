//! Compiler configuration.
//!
//! The configuration can be deserialized from YAML or JSON, or assembled from
//! the string-valued `table.*` options a SQL session carries.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ConfigError;

/// Default value of [`DistinctSplitConfig::bucket_count`].
pub const fn default_bucket_count() -> u32 {
    1024
}

pub const OPTION_SPLIT_ENABLED: &str = "table.optimizer.distinct-agg.split.enabled";
pub const OPTION_SPLIT_BUCKET_NUM: &str = "table.optimizer.distinct-agg.split.bucket-num";
pub const OPTION_EARLY_FIRE_ENABLED: &str = "table.exec.emit.early-fire.enabled";
pub const OPTION_EARLY_FIRE_DELAY: &str = "table.exec.emit.early-fire.delay";
pub const OPTION_ALLOW_LATENESS: &str = "table.exec.emit.allow-lateness";

/// Window aggregate compiler configuration.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "snake_case")]
pub struct CompilerConfig {
    /// Rewriting of distinct aggregates into a local and a global stage.
    pub distinct_agg_split: DistinctSplitConfig,

    /// When and how often window results are emitted.
    pub emit: EmitConfig,
}

/// Distinct-aggregate split settings.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "snake_case")]
pub struct DistinctSplitConfig {
    /// Split distinct aggregates into a bucketed local stage and a global
    /// merge.
    pub enabled: bool,

    /// Number of hash buckets of the local stage.
    ///
    /// Spreads skewed distinct keys across more parallel tasks.  This is a
    /// configuration value, not derived from the data.
    pub bucket_count: u32,
}

impl Default for DistinctSplitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bucket_count: default_bucket_count(),
        }
    }
}

/// Emit settings of window aggregates.
///
/// By default a window emits its result exactly once, when it closes.  Early
/// firing or accepting late rows means emitted results may later be
/// corrected.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "snake_case")]
pub struct EmitConfig {
    /// Emit intermediate results before a window closes.
    pub early_fire_enabled: bool,

    /// Interval between early firings.
    pub early_fire_delay_millis: u64,

    /// How long after a window closes late rows still update it.
    /// Only meaningful for event-time windows.
    pub allow_lateness_millis: u64,
}

impl CompilerConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from session options, e.g.
    /// `table.optimizer.distinct-agg.split.enabled = true`.
    pub fn from_options<'a, I>(options: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (key, value) in options {
            config.set_option(key, value)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn set_option(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidOption {
            key: key.to_string(),
            value: value.to_string(),
            reason,
        };
        match key {
            OPTION_SPLIT_ENABLED => {
                self.distinct_agg_split.enabled =
                    value.trim().parse().map_err(|e| invalid(format!("{e}")))?;
            }
            OPTION_SPLIT_BUCKET_NUM => {
                self.distinct_agg_split.bucket_count =
                    value.trim().parse().map_err(|e| invalid(format!("{e}")))?;
            }
            OPTION_EARLY_FIRE_ENABLED => {
                self.emit.early_fire_enabled =
                    value.trim().parse().map_err(|e| invalid(format!("{e}")))?;
            }
            OPTION_EARLY_FIRE_DELAY => {
                self.emit.early_fire_delay_millis = parse_duration_millis(value).map_err(invalid)?;
            }
            OPTION_ALLOW_LATENESS => {
                self.emit.allow_lateness_millis = parse_duration_millis(value).map_err(invalid)?;
            }
            _ => {
                return Err(ConfigError::UnknownOption {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.distinct_agg_split.bucket_count == 0 {
            return Err(ConfigError::ZeroBucketCount);
        }
        if self.emit.early_fire_enabled && self.emit.early_fire_delay_millis == 0 {
            return Err(ConfigError::MissingEarlyFireDelay);
        }
        Ok(())
    }

    pub fn with_distinct_split(mut self, enabled: bool) -> Self {
        self.distinct_agg_split.enabled = enabled;
        self
    }
}

/// Parses durations such as `500 ms`, `10 s`, `5 min`, `1 h` or a bare
/// number of milliseconds.
fn parse_duration_millis(value: &str) -> Result<u64, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: u64 = number
        .parse()
        .map_err(|_| "expected a non-negative number followed by a time unit".to_string())?;
    let factor = match unit.trim() {
        "" | "ms" | "milli" | "millis" => 1,
        "s" | "sec" | "second" | "seconds" => 1_000,
        "min" | "minute" | "minutes" => 60_000,
        "h" | "hour" | "hours" => 3_600_000,
        "d" | "day" | "days" => 86_400_000,
        other => return Err(format!("unknown time unit '{other}'")),
    };
    number
        .checked_mul(factor)
        .ok_or_else(|| "duration overflows 64 bits".to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = CompilerConfig::default();
        assert!(!config.distinct_agg_split.enabled);
        assert_eq!(config.distinct_agg_split.bucket_count, 1024);
        assert!(!config.emit.early_fire_enabled);
        assert_eq!(config.emit.allow_lateness_millis, 0);
    }

    #[test]
    fn yaml() {
        let config = CompilerConfig::from_yaml_str(
            r#"
distinct_agg_split:
  enabled: true
  bucket_count: 16
emit:
  allow_lateness_millis: 2000
"#,
        )
        .unwrap();
        assert_eq!(
            config,
            CompilerConfig {
                distinct_agg_split: DistinctSplitConfig {
                    enabled: true,
                    bucket_count: 16
                },
                emit: EmitConfig {
                    early_fire_enabled: false,
                    early_fire_delay_millis: 0,
                    allow_lateness_millis: 2000,
                },
            }
        );

        assert_eq!(
            CompilerConfig::from_json_str(r#"{"distinct_agg_split": {"bucket_count": 0}}"#),
            Err(ConfigError::ZeroBucketCount)
        );
        assert!(matches!(
            CompilerConfig::from_yaml_str("distinct_agg_split: [1, 2]"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn session_options() {
        let config = CompilerConfig::from_options([
            (OPTION_SPLIT_ENABLED, "true"),
            (OPTION_SPLIT_BUCKET_NUM, "8"),
            (OPTION_EARLY_FIRE_ENABLED, "true"),
            (OPTION_EARLY_FIRE_DELAY, "5 s"),
            (OPTION_ALLOW_LATENESS, "1min"),
        ])
        .unwrap();
        assert!(config.distinct_agg_split.enabled);
        assert_eq!(config.distinct_agg_split.bucket_count, 8);
        assert!(config.emit.early_fire_enabled);
        assert_eq!(config.emit.early_fire_delay_millis, 5_000);
        assert_eq!(config.emit.allow_lateness_millis, 60_000);

        assert_eq!(
            CompilerConfig::from_options([(OPTION_EARLY_FIRE_ENABLED, "true")]),
            Err(ConfigError::MissingEarlyFireDelay)
        );
        assert!(matches!(
            CompilerConfig::from_options([(OPTION_SPLIT_ENABLED, "yes")]),
            Err(ConfigError::InvalidOption { .. })
        ));
        assert!(matches!(
            CompilerConfig::from_options([(OPTION_ALLOW_LATENESS, "3 weeks")]),
            Err(ConfigError::InvalidOption { .. })
        ));
        assert_eq!(
            CompilerConfig::from_options([("table.exec.mini-batch.enabled", "true")]),
            Err(ConfigError::UnknownOption {
                key: "table.exec.mini-batch.enabled".to_string()
            })
        );
    }
}
