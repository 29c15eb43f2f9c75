//! Blocking Checker — a pure predicate over the current Issue set.
//!
//! No I/O, no side effects; the scheduler calls this once per tick with data
//! it already fetched, the same shape as the teacher's `plan_cycle`.

use crate::issue::Issue;
use crate::labels::Label;

/// Labels that, when present on any Issue, mean a plan/queued-to-planning
/// cycle may not start this tick, plus whether an un-merged open PR counts
/// the same way.
#[derive(Debug, Clone)]
pub struct BlockingPolicy {
    pub in_flight_labels: Vec<&'static str>,
    pub block_on_open_prs: bool,
}

impl Default for BlockingPolicy {
    fn default() -> Self {
        Self {
            in_flight_labels: vec![
                Label::Planning.as_str(),
                Label::Doing.as_str(),
                Label::Reviewing.as_str(),
                Label::Revising.as_str(),
            ],
            block_on_open_prs: true,
        }
    }
}

/// May a new plan/queued-to-planning cycle start this tick?
///
/// Returns false if any Issue currently carries one of `policy.in_flight_labels`,
/// or (when `policy.block_on_open_prs`) if any Issue carries an open PR
/// reference that has neither `soba:lgtm` nor `soba:merged`. Review,
/// implement, and revise transitions are never blocked by this predicate —
/// they advance already-in-flight work.
pub fn may_start_new_cycle(issues: &[Issue], open_pr_labels: &[Vec<String>], policy: &BlockingPolicy) -> bool {
    let has_in_flight = issues.iter().any(|issue| {
        policy
            .in_flight_labels
            .iter()
            .any(|l| issue.has_label(l))
    });
    if has_in_flight {
        return false;
    }

    if policy.block_on_open_prs {
        let has_unresolved_pr = open_pr_labels.iter().any(|labels| {
            !labels.iter().any(|l| l == Label::Lgtm.as_str())
                && !labels.iter().any(|l| l == Label::Merged.as_str())
        });
        if has_unresolved_pr {
            return false;
        }
    }

    true
}
