//! Window table-valued function specifications.
//!
//! A [`WindowSpec`] describes one `TUMBLE`, `HOP` or `CUMULATE` window over a
//! time attribute.  Specs are validated on construction and immutable
//! afterwards, so every spec that exists satisfies:
//!
//! * `size > 0`;
//! * hop windows have `slide > 0`;
//! * cumulate windows have `step > 0` and `size % step == 0`;
//! * `0 <= offset < unit`, where the unit is the slide, step or size;
//! * every duration is a whole number of milliseconds;
//! * a row belongs to at most [`MAX_WINDOWS_PER_ROW`] windows.

use std::fmt::{self, Display};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ConfigError;
use crate::time::whole_millis;

/// Limit on the number of windows a single row may be assigned to, i.e. on
/// `ceil(size / slide)` for hop and `size / step` for cumulate windows.
pub const MAX_WINDOWS_PER_ROW: u64 = 100_000;

/// Kind of window table-valued function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowKind {
    Tumble,
    Hop,
    Cumulate,
}

impl WindowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tumble => "TUMBLE",
            Self::Hop => "HOP",
            Self::Cumulate => "CUMULATE",
        }
    }
}

impl Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notion of time that drives window assignment and closing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeDomain {
    /// Windows close when the watermark passes their end.
    EventTime,
    /// Windows close when the wall clock passes their end.
    ProcessingTime,
}

/// Validated window specification.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "WindowConfig", into = "WindowConfig")]
pub struct WindowSpec {
    kind: WindowKind,
    time_attribute: String,
    time_domain: TimeDomain,
    size: Duration,
    slide: Option<Duration>,
    step: Option<Duration>,
    offset: Option<Duration>,
}

impl WindowSpec {
    /// `TUMBLE(TABLE t, DESCRIPTOR(time_attribute), size)`.
    pub fn tumble(
        time_attribute: impl Into<String>,
        time_domain: TimeDomain,
        size: Duration,
    ) -> Result<Self, ConfigError> {
        Self::from_parts(
            WindowKind::Tumble,
            time_attribute.into(),
            time_domain,
            size,
            None,
            None,
            None,
        )
    }

    /// `HOP(TABLE t, DESCRIPTOR(time_attribute), slide, size)`.
    pub fn hop(
        time_attribute: impl Into<String>,
        time_domain: TimeDomain,
        size: Duration,
        slide: Duration,
    ) -> Result<Self, ConfigError> {
        Self::from_parts(
            WindowKind::Hop,
            time_attribute.into(),
            time_domain,
            size,
            Some(slide),
            None,
            None,
        )
    }

    /// `CUMULATE(TABLE t, DESCRIPTOR(time_attribute), step, size)`.
    pub fn cumulate(
        time_attribute: impl Into<String>,
        time_domain: TimeDomain,
        size: Duration,
        step: Duration,
    ) -> Result<Self, ConfigError> {
        Self::from_parts(
            WindowKind::Cumulate,
            time_attribute.into(),
            time_domain,
            size,
            None,
            Some(step),
            None,
        )
    }

    /// Returns a copy of this spec with all window boundaries shifted by
    /// `offset`.
    pub fn with_offset(self, offset: Duration) -> Result<Self, ConfigError> {
        Self::from_parts(
            self.kind,
            self.time_attribute,
            self.time_domain,
            self.size,
            self.slide,
            self.step,
            Some(offset),
        )
    }

    /// Builds and validates a spec from its individual parameters.
    pub fn from_parts(
        kind: WindowKind,
        time_attribute: String,
        time_domain: TimeDomain,
        size: Duration,
        slide: Option<Duration>,
        step: Option<Duration>,
        offset: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        let spec = Self {
            kind,
            time_attribute,
            time_domain,
            size,
            slide,
            step,
            offset,
        };
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.time_attribute.is_empty() {
            return Err(ConfigError::EmptyTimeAttribute);
        }

        let size = positive_millis("size", self.size)?;
        let kind = self.kind.as_str();
        match self.kind {
            WindowKind::Tumble => {
                reject_parameter(kind, "slide", self.slide)?;
                reject_parameter(kind, "step", self.step)?;
            }
            WindowKind::Hop => {
                reject_parameter(kind, "step", self.step)?;
                let slide = self.slide.ok_or(ConfigError::MissingParameter {
                    kind,
                    parameter: "slide",
                })?;
                positive_millis("slide", slide)?;
            }
            WindowKind::Cumulate => {
                reject_parameter(kind, "slide", self.slide)?;
                let step = self.step.ok_or(ConfigError::MissingParameter {
                    kind,
                    parameter: "step",
                })?;
                let step = positive_millis("step", step)?;
                if size % step != 0 {
                    return Err(ConfigError::SizeNotMultipleOfStep {
                        size_millis: size,
                        step_millis: step,
                    });
                }
            }
        }

        let windows = self.windows_per_row();
        if windows > MAX_WINDOWS_PER_ROW {
            return Err(ConfigError::TooManyWindowsPerRow {
                windows,
                limit: MAX_WINDOWS_PER_ROW,
            });
        }

        if let Some(offset) = self.offset {
            let offset = whole_millis(offset).ok_or(ConfigError::NotWholeMillis {
                parameter: "offset",
            })?;
            let unit_millis = self.unit_millis();
            if offset >= unit_millis {
                return Err(ConfigError::OffsetOutOfRange {
                    offset_millis: offset,
                    unit: self.unit_name(),
                    unit_millis,
                });
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    pub fn time_attribute(&self) -> &str {
        &self.time_attribute
    }

    pub fn time_domain(&self) -> TimeDomain {
        self.time_domain
    }

    pub fn size(&self) -> Duration {
        self.size
    }

    pub fn slide(&self) -> Option<Duration> {
        self.slide
    }

    pub fn step(&self) -> Option<Duration> {
        self.step
    }

    pub fn offset(&self) -> Option<Duration> {
        self.offset
    }

    pub fn size_millis(&self) -> i64 {
        millis_of(self.size)
    }

    pub fn slide_millis(&self) -> Option<i64> {
        self.slide.map(millis_of)
    }

    pub fn step_millis(&self) -> Option<i64> {
        self.step.map(millis_of)
    }

    /// Offset in milliseconds; zero when no offset was given.
    pub fn offset_millis(&self) -> i64 {
        self.offset.map(millis_of).unwrap_or(0)
    }

    /// The granularity at which window boundaries are laid out: the slide
    /// for hop windows, the step for cumulate windows, the size otherwise.
    pub fn unit_millis(&self) -> i64 {
        self.slide_millis()
            .or(self.step_millis())
            .unwrap_or(self.size_millis())
    }

    fn unit_name(&self) -> &'static str {
        match self.kind {
            WindowKind::Tumble => "size",
            WindowKind::Hop => "slide",
            WindowKind::Cumulate => "step",
        }
    }

    /// Upper bound on the number of windows a single row is assigned to.
    /// Never exceeds [`MAX_WINDOWS_PER_ROW`].
    pub fn max_windows_per_row(&self) -> usize {
        usize::try_from(self.windows_per_row()).unwrap_or(usize::MAX)
    }

    fn windows_per_row(&self) -> u64 {
        let size = self.size_millis().unsigned_abs();
        let unit = self.unit_millis().unsigned_abs().max(1);
        match self.kind {
            WindowKind::Tumble => 1,
            WindowKind::Hop => size.div_ceil(unit),
            WindowKind::Cumulate => size / unit,
        }
    }

    pub fn is_event_time(&self) -> bool {
        self.time_domain == TimeDomain::EventTime
    }
}

impl Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}", self.kind, self.time_attribute)?;
        if let Some(slide) = self.slide_millis() {
            write!(f, ", slide={slide}ms")?;
        }
        if let Some(step) = self.step_millis() {
            write!(f, ", step={step}ms")?;
        }
        write!(f, ", size={}ms", self.size_millis())?;
        if self.offset.is_some() {
            write!(f, ", offset={}ms", self.offset_millis())?;
        }
        write!(f, ")")
    }
}

fn positive_millis(parameter: &'static str, duration: Duration) -> Result<i64, ConfigError> {
    let millis = whole_millis(duration).ok_or(ConfigError::NotWholeMillis { parameter })?;
    if millis == 0 {
        return Err(ConfigError::NonPositive { parameter });
    }
    Ok(millis)
}

fn reject_parameter(
    kind: &'static str,
    parameter: &'static str,
    value: Option<Duration>,
) -> Result<(), ConfigError> {
    match value {
        Some(_) => Err(ConfigError::UnexpectedParameter { kind, parameter }),
        None => Ok(()),
    }
}

// Only called on validated durations.
fn millis_of(duration: Duration) -> i64 {
    duration.as_millis() as i64
}

/// Persisted form of a [`WindowSpec`], with durations in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WindowConfig {
    pub time_attribute: String,
    pub time_domain: TimeDomain,
    pub window_kind: WindowKind,
    pub size_millis: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_millis: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_millis: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_millis: Option<u64>,
}

impl From<WindowSpec> for WindowConfig {
    fn from(spec: WindowSpec) -> Self {
        let millis = |d: Duration| d.as_millis() as u64;
        Self {
            size_millis: millis(spec.size),
            slide_millis: spec.slide.map(millis),
            step_millis: spec.step.map(millis),
            offset_millis: spec.offset.map(millis),
            time_attribute: spec.time_attribute,
            time_domain: spec.time_domain,
            window_kind: spec.kind,
        }
    }
}

impl TryFrom<WindowConfig> for WindowSpec {
    type Error = ConfigError;

    fn try_from(config: WindowConfig) -> Result<Self, Self::Error> {
        WindowSpec::from_parts(
            config.window_kind,
            config.time_attribute,
            config.time_domain,
            Duration::from_millis(config.size_millis),
            config.slide_millis.map(Duration::from_millis),
            config.step_millis.map(Duration::from_millis),
            config.offset_millis.map(Duration::from_millis),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn valid_specs() {
        let tumble = WindowSpec::tumble("rowtime", TimeDomain::EventTime, secs(5)).unwrap();
        assert_eq!(tumble.unit_millis(), 5_000);
        assert_eq!(tumble.max_windows_per_row(), 1);

        let hop = WindowSpec::hop("rowtime", TimeDomain::EventTime, secs(10), secs(5)).unwrap();
        assert_eq!(hop.unit_millis(), 5_000);
        assert_eq!(hop.max_windows_per_row(), 2);

        let cumulate =
            WindowSpec::cumulate("proctime", TimeDomain::ProcessingTime, secs(15), secs(5))
                .unwrap()
                .with_offset(secs(1))
                .unwrap();
        assert_eq!(cumulate.offset_millis(), 1_000);
        assert_eq!(cumulate.max_windows_per_row(), 3);
        assert_eq!(
            cumulate.to_string(),
            "CUMULATE(proctime, step=5000ms, size=15000ms, offset=1000ms)"
        );
    }

    #[test]
    fn extreme_parameters() {
        let max = Duration::from_millis(i64::MAX as u64);
        assert_eq!(
            WindowSpec::hop("rowtime", TimeDomain::EventTime, max, Duration::from_millis(2)),
            Err(ConfigError::TooManyWindowsPerRow {
                windows: 1 << 62,
                limit: MAX_WINDOWS_PER_ROW
            })
        );
        let hop =
            WindowSpec::hop("rowtime", TimeDomain::EventTime, max, Duration::from_millis(1 << 62))
                .unwrap();
        assert_eq!(hop.max_windows_per_row(), 2);
        let tumble = WindowSpec::tumble("rowtime", TimeDomain::EventTime, max).unwrap();
        assert_eq!(tumble.max_windows_per_row(), 1);

        let century = secs(3_153_600_000);
        assert_eq!(
            WindowSpec::cumulate("rowtime", TimeDomain::EventTime, century, Duration::from_millis(1)),
            Err(ConfigError::TooManyWindowsPerRow {
                windows: 3_153_600_000_000,
                limit: MAX_WINDOWS_PER_ROW
            })
        );
        let daily = WindowSpec::cumulate("rowtime", TimeDomain::EventTime, century, secs(86_400))
            .unwrap();
        assert_eq!(daily.max_windows_per_row(), 36_500);

        let ms = Duration::from_millis;
        assert!(WindowSpec::hop("rowtime", TimeDomain::EventTime, ms(100_000), ms(1)).is_ok());
        assert!(matches!(
            WindowSpec::hop("rowtime", TimeDomain::EventTime, ms(100_001), ms(1)),
            Err(ConfigError::TooManyWindowsPerRow { windows: 100_001, .. })
        ));
    }

    #[test]
    fn invalid_specs() {
        assert_eq!(
            WindowSpec::tumble("rowtime", TimeDomain::EventTime, secs(0)),
            Err(ConfigError::NonPositive { parameter: "size" })
        );
        assert_eq!(
            WindowSpec::tumble("", TimeDomain::EventTime, secs(1)),
            Err(ConfigError::EmptyTimeAttribute)
        );
        assert_eq!(
            WindowSpec::hop("rowtime", TimeDomain::EventTime, secs(10), secs(0)),
            Err(ConfigError::NonPositive { parameter: "slide" })
        );
        assert_eq!(
            WindowSpec::cumulate("rowtime", TimeDomain::EventTime, secs(15), secs(4)),
            Err(ConfigError::SizeNotMultipleOfStep {
                size_millis: 15_000,
                step_millis: 4_000
            })
        );
        assert_eq!(
            WindowSpec::tumble("rowtime", TimeDomain::EventTime, secs(5))
                .unwrap()
                .with_offset(secs(5)),
            Err(ConfigError::OffsetOutOfRange {
                offset_millis: 5_000,
                unit: "size",
                unit_millis: 5_000
            })
        );
        assert_eq!(
            WindowSpec::tumble("rowtime", TimeDomain::EventTime, Duration::from_micros(10)),
            Err(ConfigError::NotWholeMillis { parameter: "size" })
        );
        assert_eq!(
            WindowSpec::from_parts(
                WindowKind::Tumble,
                "rowtime".to_string(),
                TimeDomain::EventTime,
                secs(5),
                Some(secs(1)),
                None,
                None
            ),
            Err(ConfigError::UnexpectedParameter {
                kind: "TUMBLE",
                parameter: "slide"
            })
        );
        assert_eq!(
            WindowSpec::from_parts(
                WindowKind::Hop,
                "rowtime".to_string(),
                TimeDomain::EventTime,
                secs(5),
                None,
                None,
                None
            ),
            Err(ConfigError::MissingParameter {
                kind: "HOP",
                parameter: "slide"
            })
        );
    }

    #[test]
    fn json_form() {
        let hop = WindowSpec::hop("rowtime", TimeDomain::EventTime, secs(10), secs(5))
            .unwrap()
            .with_offset(secs(2))
            .unwrap();
        let json = serde_json::to_value(&hop).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "timeAttribute": "rowtime",
                "timeDomain": "EVENT_TIME",
                "windowKind": "HOP",
                "sizeMillis": 10000,
                "slideMillis": 5000,
                "offsetMillis": 2000
            })
        );
        assert_eq!(serde_json::from_value::<WindowSpec>(json).unwrap(), hop);

        let invalid = serde_json::json!({
            "timeAttribute": "rowtime",
            "timeDomain": "EVENT_TIME",
            "windowKind": "CUMULATE",
            "sizeMillis": 10000,
            "stepMillis": 3000
        });
        assert!(serde_json::from_value::<WindowSpec>(invalid).is_err());
    }
}
