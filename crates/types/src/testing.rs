//! Proptest strategies for planner types.

use std::time::Duration;

use proptest::prelude::*;

use crate::changelog::ChangelogMode;
use crate::window::{TimeDomain, WindowSpec};

pub fn time_domain() -> impl Strategy<Value = TimeDomain> {
    prop_oneof![Just(TimeDomain::EventTime), Just(TimeDomain::ProcessingTime)]
}

pub fn changelog_mode() -> impl Strategy<Value = ChangelogMode> {
    prop::sample::select(ChangelogMode::ALL.to_vec())
}

/// Valid window specs over `time_attribute`, with sizes up to a minute.
pub fn window_spec(time_attribute: &'static str) -> impl Strategy<Value = WindowSpec> {
    let tumble = (1..60_000u64, any::<prop::sample::Index>()).prop_map(move |(size, offset)| {
        (
            WindowSpec::tumble(time_attribute, TimeDomain::EventTime, ms(size)),
            offset.index(size as usize) as u64,
        )
    });
    let hop = (1..10_000u64, 1..8u64, any::<prop::sample::Index>()).prop_map(
        move |(slide, factor, offset)| {
            (
                WindowSpec::hop(
                    time_attribute,
                    TimeDomain::EventTime,
                    ms(slide * factor),
                    ms(slide),
                ),
                offset.index(slide as usize) as u64,
            )
        },
    );
    let cumulate = (1..10_000u64, 1..8u64, any::<prop::sample::Index>()).prop_map(
        move |(step, factor, offset)| {
            (
                WindowSpec::cumulate(
                    time_attribute,
                    TimeDomain::EventTime,
                    ms(step * factor),
                    ms(step),
                ),
                offset.index(step as usize) as u64,
            )
        },
    );
    (prop_oneof![tumble, hop, cumulate], any::<bool>()).prop_map(|((spec, offset), with_offset)| {
        // Strategies above only produce valid parameters.
        let spec = spec.unwrap();
        if with_offset {
            spec.with_offset(ms(offset)).unwrap()
        } else {
            spec
        }
    })
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
