//! Field set comparison between result emissions
//!
//! Invoked on every poll tick, so it works on the slices directly without
//! building sets. Inputs are expected to be deduplicated.

#![warn(clippy::all, rust_2018_idioms)]

/// True when `current` differs from `previous` as an unordered set
pub fn changed(previous: Option<&[String]>, current: &[String]) -> bool {
    let Some(previous) = previous else {
        return true;
    };

    if previous.len() != current.len() {
        return true;
    }

    !(previous.iter().all(|name| current.contains(name))
        && current.iter().all(|name| previous.contains(name)))
}
