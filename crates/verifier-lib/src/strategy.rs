//! Placement strategy checker
//!
//! Verifies that the logical CPUs bound to one container match the placement
//! strategy the container declared:
//! - `spread`: no physical core hosts two of the container's logical CPUs
//! - `sameCoreFirst`: both hyperthreads of a core are filled before another
//!   core is opened

use crate::topology::core_histogram;
use crate::verdict::Verdict;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const SPREAD_TAG: &str = "spread";
pub const SAME_CORE_FIRST_TAG: &str = "sameCoreFirst";

/// Declared placement intent for a container's cpuset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PlacementStrategy {
    Spread,
    SameCoreFirst,
    /// Any tag the checker does not recognise, kept verbatim for reporting
    Unsupported(String),
}

impl PlacementStrategy {
    pub fn as_str(&self) -> &str {
        match self {
            PlacementStrategy::Spread => SPREAD_TAG,
            PlacementStrategy::SameCoreFirst => SAME_CORE_FIRST_TAG,
            PlacementStrategy::Unsupported(tag) => tag,
        }
    }
}

impl FromStr for PlacementStrategy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        Ok(if tag.eq_ignore_ascii_case(SPREAD_TAG) {
            PlacementStrategy::Spread
        } else if tag.eq_ignore_ascii_case(SAME_CORE_FIRST_TAG) {
            PlacementStrategy::SameCoreFirst
        } else {
            PlacementStrategy::Unsupported(tag.to_string())
        })
    }
}

impl From<String> for PlacementStrategy {
    fn from(tag: String) -> Self {
        match tag.parse() {
            Ok(strategy) => strategy,
            Err(never) => match never {},
        }
    }
}

impl From<PlacementStrategy> for String {
    fn from(strategy: PlacementStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

impl fmt::Display for PlacementStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check a container's bound logical CPUs against its declared strategy.
///
/// `skip` short-circuits to `true` so randomized or mixed-strategy callers
/// keep a uniform call shape. Unsupported strategies and a zero core count
/// yield `false`.
pub fn check_placement(
    cpu_ids: &[u32],
    physical_core_count: u32,
    strategy: &PlacementStrategy,
    skip: bool,
) -> bool {
    evaluate_placement(cpu_ids, physical_core_count, strategy, skip).is_pass()
}

/// Same decision as [`check_placement`], with the reason attached
pub fn evaluate_placement(
    cpu_ids: &[u32],
    physical_core_count: u32,
    strategy: &PlacementStrategy,
    skip: bool,
) -> Verdict {
    if skip {
        return Verdict::Pass;
    }

    let Some(histogram) = core_histogram(cpu_ids, physical_core_count) else {
        return Verdict::invalid("physical core count is zero");
    };

    match strategy {
        PlacementStrategy::Spread => {
            match histogram.iter().find(|(_, &count)| count > 1) {
                Some((core, count)) => Verdict::violated(format!(
                    "spread: physical core {} hosts {} logical cpus",
                    core, count
                )),
                None => Verdict::Pass,
            }
        }
        PlacementStrategy::SameCoreFirst => {
            // A single populated core is always packed as tightly as possible.
            if histogram.len() < 2 {
                return Verdict::Pass;
            }

            // Odd requests leave exactly one half-filled core.
            let allowed_partial = usize::from(cpu_ids.len() % 2 == 1);
            let partial: Vec<u32> = histogram
                .iter()
                .filter(|(_, &count)| count < 2)
                .map(|(&core, _)| core)
                .collect();

            if partial.len() > allowed_partial {
                Verdict::violated(format!(
                    "sameCoreFirst: {} logical cpus on {} physical cores, under-filled {:?}",
                    cpu_ids.len(),
                    histogram.len(),
                    partial
                ))
            } else {
                Verdict::Pass
            }
        }
        PlacementStrategy::Unsupported(tag) => Verdict::UnsupportedStrategy {
            strategy: tag.clone(),
        },
    }
}
