//! Over-quota binding checker
//!
//! A node configured with an over-quota ratio `r` may bind each CPU up to
//! `ceil(r)` times. Two limits apply together:
//! - per CPU: no single use count above `ceil(r)`
//! - aggregate: the summed use counts stay within `total_cpus * ceil(r)`

use crate::tally::CoreUseTally;
use crate::verdict::Verdict;

/// Largest number of bindings a single CPU may carry under `ratio`.
///
/// Ratios beyond `u64::MAX` saturate.
pub fn per_core_ceiling(ratio: f64) -> Option<u64> {
    if !ratio.is_finite() || ratio < 1.0 {
        return None;
    }
    Some(ratio.ceil() as u64)
}

/// Check a node's tally against its over-quota ratio
pub fn check_over_quota(
    tally: &CoreUseTally,
    total_physical_cores: u32,
    over_quota_ratio: f64,
) -> bool {
    evaluate_over_quota(tally, total_physical_cores, over_quota_ratio).is_pass()
}

/// Same decision as [`check_over_quota`], with the reason attached
pub fn evaluate_over_quota(
    tally: &CoreUseTally,
    total_physical_cores: u32,
    over_quota_ratio: f64,
) -> Verdict {
    let Some(ceiling) = per_core_ceiling(over_quota_ratio) else {
        return Verdict::invalid(format!(
            "over-quota ratio {} must be a finite value >= 1.0",
            over_quota_ratio
        ));
    };

    if let Some((cpu, count)) = tally.iter().find(|&(_, count)| u64::from(count) > ceiling) {
        return Verdict::violated(format!(
            "cpu {} bound {} times, ceiling is {}",
            cpu, count, ceiling
        ));
    }

    let budget = u64::from(total_physical_cores).saturating_mul(ceiling);
    let bound_total = tally.bound_total();
    if bound_total > budget {
        return Verdict::violated(format!(
            "{} bindings exceed node budget {} ({} cpus x {})",
            bound_total, budget, total_physical_cores, ceiling
        ));
    }

    Verdict::Pass
}
