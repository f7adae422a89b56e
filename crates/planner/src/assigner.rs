//! Assignment of rows to window intervals.

use std::fmt::{self, Display};

use winplan_types::time::Timestamp;
use winplan_types::window::{WindowKind, WindowSpec};

/// Half-open interval `[start, end)` of one window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowInterval {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl WindowInterval {
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start: Timestamp::from_millis(start),
            end: Timestamp::from_millis(end),
        }
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t < self.end
    }

    /// Latest timestamp that belongs to the window.  The window fires once
    /// time progresses to this point.
    pub fn max_timestamp(&self) -> Timestamp {
        self.end.saturating_sub_millis(1)
    }

    pub fn width_millis(&self) -> i64 {
        self.end.millis() - self.start.millis()
    }
}

impl Display for WindowInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Start of the window of width `unit` containing `t`, with boundaries laid
/// out at `offset + k * unit`.
///
/// The offset is removed before the modulo and floor division is Euclidean,
/// so timestamps before the epoch round down as well.
fn window_start(t: i128, offset: i128, unit: i128) -> i128 {
    t - (t - offset).rem_euclid(unit)
}

/// Returns the windows `t` belongs to, ordered by start and then by end.
///
/// * `TUMBLE`: the single window `[start, start + size)`.
/// * `HOP`: every window of width `size` starting at `offset + k * slide`
///   that contains `t`.
/// * `CUMULATE`: the windows `[w, w + k * step)` for `k` in `1..=size/step`
///   that contain `t`, where `w` is the start of the `size`-wide tumbling
///   window containing `t`.
///
/// Windows whose bounds do not fit in a [`Timestamp`] are omitted.
pub fn assign(t: Timestamp, spec: &WindowSpec) -> Vec<WindowInterval> {
    let t = i128::from(t.millis());
    let offset = i128::from(spec.offset_millis());
    let size = i128::from(spec.size_millis());

    let mut windows: Vec<(i128, i128)> = Vec::new();
    match spec.kind() {
        WindowKind::Tumble => {
            let start = window_start(t, offset, size);
            windows.push((start, start + size));
        }
        WindowKind::Hop => {
            let slide = i128::from(spec.unit_millis());
            let last_start = window_start(t, offset, slide);
            let mut start = last_start;
            while start > t - size {
                windows.push((start, start + size));
                start -= slide;
            }
            windows.reverse();
        }
        WindowKind::Cumulate => {
            let step = i128::from(spec.unit_millis());
            let start = window_start(t, offset, size);
            // First step boundary after `t`.
            let mut end = start + ((t - start) / step + 1) * step;
            while end <= start + size {
                windows.push((start, end));
                end += step;
            }
        }
    }

    windows
        .into_iter()
        .filter_map(|(start, end)| {
            Some(WindowInterval::new(
                i64::try_from(start).ok()?,
                i64::try_from(end).ok()?,
            ))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use winplan_types::testing::window_spec;
    use winplan_types::window::{TimeDomain, WindowSpec};

    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn at(millis: i64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    fn intervals(windows: &[(i64, i64)]) -> Vec<WindowInterval> {
        windows
            .iter()
            .map(|(start, end)| WindowInterval::new(*start, *end))
            .collect()
    }

    fn without_offset(spec: &WindowSpec) -> WindowSpec {
        WindowSpec::from_parts(
            spec.kind(),
            spec.time_attribute().to_string(),
            spec.time_domain(),
            spec.size(),
            spec.slide(),
            spec.step(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn tumble() {
        let spec = WindowSpec::tumble("rowtime", TimeDomain::EventTime, secs(5)).unwrap();
        assert_eq!(assign(at(2_000), &spec), intervals(&[(0, 5_000)]));
        assert_eq!(assign(at(4_999), &spec), intervals(&[(0, 5_000)]));

        // A timestamp on a boundary belongs to the window starting there.
        assert_eq!(assign(at(5_000), &spec), intervals(&[(5_000, 10_000)]));

        assert_eq!(assign(at(-1), &spec), intervals(&[(-5_000, 0)]));

        let spec = spec.with_offset(secs(1)).unwrap();
        assert_eq!(assign(at(500), &spec), intervals(&[(-4_000, 1_000)]));
        assert_eq!(assign(at(1_000), &spec), intervals(&[(1_000, 6_000)]));
    }

    #[test]
    fn hop() {
        let spec =
            WindowSpec::hop("rowtime", TimeDomain::EventTime, secs(10), secs(5)).unwrap();
        assert_eq!(
            assign(at(7_000), &spec),
            intervals(&[(0, 10_000), (5_000, 15_000)])
        );
        assert_eq!(
            assign(at(10_000), &spec),
            intervals(&[(5_000, 15_000), (10_000, 20_000)])
        );
    }

    #[test]
    fn hop_with_uneven_slide() {
        let spec =
            WindowSpec::hop("rowtime", TimeDomain::EventTime, secs(10), secs(4)).unwrap();
        assert_eq!(
            assign(at(1_000), &spec),
            intervals(&[(-8_000, 2_000), (-4_000, 6_000), (0, 10_000)])
        );
        assert_eq!(
            assign(at(3_000), &spec),
            intervals(&[(-4_000, 6_000), (0, 10_000)])
        );
    }

    #[test]
    fn cumulate() {
        let spec =
            WindowSpec::cumulate("rowtime", TimeDomain::EventTime, secs(15), secs(5)).unwrap();
        assert_eq!(
            assign(at(2_000), &spec),
            intervals(&[(0, 5_000), (0, 10_000), (0, 15_000)])
        );
        assert_eq!(
            assign(at(7_000), &spec),
            intervals(&[(0, 10_000), (0, 15_000)])
        );
        assert_eq!(assign(at(14_999), &spec), intervals(&[(0, 15_000)]));
        assert_eq!(
            assign(at(15_000), &spec),
            intervals(&[(15_000, 20_000), (15_000, 25_000), (15_000, 30_000)])
        );

        let spec = spec.with_offset(secs(1)).unwrap();
        assert_eq!(
            assign(at(7_000), &spec),
            intervals(&[(1_000, 11_000), (1_000, 16_000)])
        );
    }

    #[test]
    fn extreme_timestamps() {
        let spec = WindowSpec::tumble("rowtime", TimeDomain::EventTime, secs(5)).unwrap();
        assert_eq!(assign(at(i64::MAX), &spec), Vec::new());
        assert_eq!(assign(at(i64::MIN), &spec), Vec::new());
    }

    #[test]
    fn extreme_parameters() {
        let max = Duration::from_millis(i64::MAX as u64);

        let tumble = WindowSpec::tumble("rowtime", TimeDomain::EventTime, max).unwrap();
        assert_eq!(assign(at(0), &tumble), intervals(&[(0, i64::MAX)]));
        assert_eq!(assign(at(-1), &tumble), intervals(&[(-i64::MAX, 0)]));

        let hop = WindowSpec::hop(
            "rowtime",
            TimeDomain::EventTime,
            max,
            Duration::from_millis(1 << 62),
        )
        .unwrap();
        assert_eq!(
            assign(at(0), &hop),
            intervals(&[(-(1 << 62), (1 << 62) - 1), (0, i64::MAX)])
        );

        // One window per day for a century: a row at the very end of the
        // cumulation belongs to the full window only.
        let century = secs(3_153_600_000);
        let cumulate =
            WindowSpec::cumulate("rowtime", TimeDomain::EventTime, century, secs(86_400)).unwrap();
        assert_eq!(
            assign(at(3_153_599_999_999), &cumulate),
            intervals(&[(0, 3_153_600_000_000)])
        );
        let windows = assign(at(0), &cumulate);
        assert_eq!(windows.len(), 36_500);
        assert_eq!(windows[0], WindowInterval::new(0, 86_400_000));
        assert_eq!(windows[36_499], WindowInterval::new(0, 3_153_600_000_000));
    }

    proptest! {
        #[test]
        fn coverage(spec in window_spec("rowtime"), t in -1_000_000_000i64..1_000_000_000) {
            let windows = assign(at(t), &spec);
            prop_assert!(!windows.is_empty());
            prop_assert!(windows.len() <= spec.max_windows_per_row());
            for window in &windows {
                prop_assert!(window.contains(at(t)), "{window} does not contain {t}");
                match spec.kind() {
                    WindowKind::Tumble | WindowKind::Hop => {
                        prop_assert_eq!(window.width_millis(), spec.size_millis());
                    }
                    WindowKind::Cumulate => {
                        prop_assert_eq!(window.width_millis() % spec.unit_millis(), 0);
                        prop_assert!(window.width_millis() <= spec.size_millis());
                    }
                }
                prop_assert_eq!(
                    (window.start.millis() - spec.offset_millis()).rem_euclid(spec.unit_millis()),
                    0
                );
            }
            if spec.kind() == WindowKind::Hop {
                prop_assert_eq!(windows.len(), spec.max_windows_per_row());
            }
            let mut sorted = windows.clone();
            sorted.sort();
            prop_assert_eq!(sorted, windows);
        }

        #[test]
        fn offset_shift(spec in window_spec("rowtime"), t in -1_000_000_000i64..1_000_000_000) {
            let offset = spec.offset_millis();
            let shifted: Vec<WindowInterval> = assign(at(t - offset), &without_offset(&spec))
                .into_iter()
                .map(|w| WindowInterval::new(w.start.millis() + offset, w.end.millis() + offset))
                .collect();
            prop_assert_eq!(assign(at(t), &spec), shifted);
        }

        #[test]
        fn cumulate_nesting(t in -1_000_000i64..1_000_000) {
            let spec = WindowSpec::cumulate("rowtime", TimeDomain::EventTime, secs(15), secs(5))
                .unwrap();
            let anchor = t - t.rem_euclid(15_000);
            let expected: Vec<WindowInterval> = [5_000, 10_000, 15_000]
                .into_iter()
                .map(|width| WindowInterval::new(anchor, anchor + width))
                .filter(|w| w.contains(at(t)))
                .collect();
            prop_assert_eq!(assign(at(t), &spec), expected);
        }
    }
}
