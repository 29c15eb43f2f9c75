//! Label vocabulary and Phase Strategy.
//!
//! Pure functions, no I/O: the closed set of `soba:`-prefixed labels, the
//! mapping from a label set to a [`Phase`], and the transition table that
//! decides what the next label should be once a phase's process is spawned.

use std::fmt;

/// One of the twelve labels in the closed vocabulary, always written with
/// its `soba:` prefix in [`Label::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Todo,
    Queued,
    Planning,
    Ready,
    Doing,
    ReviewRequested,
    Reviewing,
    Done,
    RequiresChanges,
    Revising,
    Lgtm,
    Merged,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "soba:todo",
            Self::Queued => "soba:queued",
            Self::Planning => "soba:planning",
            Self::Ready => "soba:ready",
            Self::Doing => "soba:doing",
            Self::ReviewRequested => "soba:review-requested",
            Self::Reviewing => "soba:reviewing",
            Self::Done => "soba:done",
            Self::RequiresChanges => "soba:requires-changes",
            Self::Revising => "soba:revising",
            Self::Lgtm => "soba:lgtm",
            Self::Merged => "soba:merged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "soba:todo" => Some(Self::Todo),
            "soba:queued" => Some(Self::Queued),
            "soba:planning" => Some(Self::Planning),
            "soba:ready" => Some(Self::Ready),
            "soba:doing" => Some(Self::Doing),
            "soba:review-requested" => Some(Self::ReviewRequested),
            "soba:reviewing" => Some(Self::Reviewing),
            "soba:done" => Some(Self::Done),
            "soba:requires-changes" => Some(Self::RequiresChanges),
            "soba:revising" => Some(Self::Revising),
            "soba:lgtm" => Some(Self::Lgtm),
            "soba:merged" => Some(Self::Merged),
            _ => None,
        }
    }

    /// Human-readable description, fixed per label (used by `soba labels init`).
    pub fn description(self) -> &'static str {
        match self {
            Self::Todo => "To-do task waiting to be queued",
            Self::Queued => "Queued for processing",
            Self::Planning => "Planning phase",
            Self::Ready => "Ready for implementation",
            Self::Doing => "In progress",
            Self::ReviewRequested => "Review requested",
            Self::Reviewing => "Under review",
            Self::Done => "Review completed",
            Self::RequiresChanges => "Changes requested",
            Self::Revising => "Revising based on review feedback",
            Self::Lgtm => "PR approved for auto-merge",
            Self::Merged => "PR merged and issue closed",
        }
    }

    /// All twelve labels, for `soba labels init`.
    pub fn all() -> [Label; 12] {
        [
            Self::Todo,
            Self::Queued,
            Self::Planning,
            Self::Ready,
            Self::Doing,
            Self::ReviewRequested,
            Self::Reviewing,
            Self::Done,
            Self::RequiresChanges,
            Self::Revising,
            Self::Lgtm,
            Self::Merged,
        ]
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage in the Issue lifecycle, derived purely from labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Plan,
    QueuedToPlanning,
    Implement,
    Review,
    Revise,
}

impl Phase {
    /// Every defined phase spawns a process; this exists for symmetry with
    /// the "in progress, no transition" case which has no `Phase` at all.
    pub fn spawns(self) -> bool {
        true
    }

    /// Whether this phase's candidates are subject to the Blocking Checker's
    /// single-active-cycle cap (plan and queued-to-planning only).
    pub fn is_gated_by_blocking_checker(self) -> bool {
        matches!(self, Self::Plan | Self::QueuedToPlanning)
    }
}

/// Scan `labels` in priority order and return the matching [`Phase`].
///
/// Returns `None` if any in-progress label (`planning`, `doing`, `reviewing`,
/// `revising`) is present — the Issue is owned by a running process — or if
/// no trigger label is present at all. Unrelated or unknown labels are
/// ignored. Order of `labels` does not affect the result.
pub fn determine_phase(labels: &[String]) -> Option<Phase> {
    let parsed: Vec<Label> = labels.iter().filter_map(|l| Label::parse(l)).collect();

    let in_progress = [
        Label::Planning,
        Label::Doing,
        Label::Reviewing,
        Label::Revising,
    ];
    if parsed.iter().any(|l| in_progress.contains(l)) {
        return None;
    }

    // Priority order: queued, todo, ready, review-requested, requires-changes.
    if parsed.contains(&Label::Queued) {
        return Some(Phase::QueuedToPlanning);
    }
    if parsed.contains(&Label::Todo) {
        return Some(Phase::Plan);
    }
    if parsed.contains(&Label::Ready) {
        return Some(Phase::Implement);
    }
    if parsed.contains(&Label::ReviewRequested) {
        return Some(Phase::Review);
    }
    if parsed.contains(&Label::RequiresChanges) {
        return Some(Phase::Revise);
    }
    None
}

/// The label the scheduler writes to claim the transition (the in-progress
/// "lock" label) for a given phase.
pub fn next_label(phase: Phase) -> Label {
    match phase {
        Phase::Plan | Phase::QueuedToPlanning => Label::Planning,
        Phase::Implement => Label::Doing,
        Phase::Review => Label::Reviewing,
        Phase::Revise => Label::Revising,
    }
}

/// The trigger label a phase is selected from (used to restore on rollback).
pub fn current_label_for_phase(phase: Phase) -> Label {
    match phase {
        Phase::Plan => Label::Todo,
        Phase::QueuedToPlanning => Label::Queued,
        Phase::Implement => Label::Ready,
        Phase::Review => Label::ReviewRequested,
        Phase::Revise => Label::RequiresChanges,
    }
}

/// The edges of the lifecycle DAG from §3: `from -> to` is a valid
/// transition iff it appears in this table.
const VALID_EDGES: &[(Label, Label)] = &[
    (Label::Todo, Label::Planning),
    (Label::Queued, Label::Planning),
    (Label::Planning, Label::Ready),
    (Label::Ready, Label::Doing),
    (Label::Doing, Label::ReviewRequested),
    (Label::ReviewRequested, Label::Reviewing),
    (Label::Reviewing, Label::Done),
    (Label::Reviewing, Label::RequiresChanges),
    (Label::RequiresChanges, Label::Revising),
    (Label::Revising, Label::Ready),
    (Label::Done, Label::Lgtm),
    (Label::Lgtm, Label::Merged),
];

/// Returns true only for edges present in the DAG above; rejects backward
/// edges and non-`soba:`-prefixed or unrecognized strings.
pub fn validate_transition(from: &str, to: &str) -> bool {
    let (Some(from), Some(to)) = (Label::parse(from), Label::parse(to)) else {
        return false;
    };
    VALID_EDGES.contains(&(from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_labels_has_no_phase() {
        assert_eq!(determine_phase(&[]), None);
    }

    #[test]
    fn unrelated_labels_are_ignored() {
        assert_eq!(determine_phase(&labels(&["bug", "good-first-issue"])), None);
    }

    #[test]
    fn todo_maps_to_plan() {
        assert_eq!(determine_phase(&labels(&["soba:todo"])), Some(Phase::Plan));
    }

    #[test]
    fn queued_maps_to_queued_to_planning() {
        assert_eq!(
            determine_phase(&labels(&["soba:queued"])),
            Some(Phase::QueuedToPlanning)
        );
    }

    #[test]
    fn ready_maps_to_implement() {
        assert_eq!(
            determine_phase(&labels(&["soba:ready"])),
            Some(Phase::Implement)
        );
    }

    #[test]
    fn review_requested_maps_to_review() {
        assert_eq!(
            determine_phase(&labels(&["soba:review-requested"])),
            Some(Phase::Review)
        );
    }

    #[test]
    fn requires_changes_maps_to_revise() {
        assert_eq!(
            determine_phase(&labels(&["soba:requires-changes"])),
            Some(Phase::Revise)
        );
    }

    #[test]
    fn in_progress_labels_return_none() {
        for l in ["soba:planning", "soba:doing", "soba:reviewing", "soba:revising"] {
            assert_eq!(determine_phase(&labels(&[l])), None, "label {l}");
        }
    }

    #[test]
    fn in_progress_label_wins_even_with_trigger_present() {
        // Should not happen in practice, but an in-progress label always
        // means "owned by a running process" regardless of what else is set.
        assert_eq!(determine_phase(&labels(&["soba:todo", "soba:doing"])), None);
    }

    #[test]
    fn order_insensitive() {
        let a = determine_phase(&labels(&["soba:ready", "bug"]));
        let b = determine_phase(&labels(&["bug", "soba:ready"]));
        assert_eq!(a, b);
        assert_eq!(a, Some(Phase::Implement));
    }

    #[test]
    fn priority_order_when_multiple_triggers_present() {
        // queued beats todo beats ready beats review-requested beats requires-changes
        assert_eq!(
            determine_phase(&labels(&["soba:todo", "soba:queued"])),
            Some(Phase::QueuedToPlanning)
        );
        assert_eq!(
            determine_phase(&labels(&["soba:ready", "soba:todo"])),
            Some(Phase::Plan)
        );
    }

    #[test]
    fn next_label_table() {
        assert_eq!(next_label(Phase::Plan), Label::Planning);
        assert_eq!(next_label(Phase::QueuedToPlanning), Label::Planning);
        assert_eq!(next_label(Phase::Implement), Label::Doing);
        assert_eq!(next_label(Phase::Review), Label::Reviewing);
        assert_eq!(next_label(Phase::Revise), Label::Revising);
    }

    #[test]
    fn valid_transitions_accepted() {
        assert!(validate_transition("soba:todo", "soba:planning"));
        assert!(validate_transition("soba:requires-changes", "soba:revising"));
        assert!(validate_transition("soba:revising", "soba:ready"));
        assert!(validate_transition("soba:done", "soba:lgtm"));
    }

    #[test]
    fn backward_edges_rejected() {
        assert!(!validate_transition("soba:planning", "soba:todo"));
        assert!(!validate_transition("soba:ready", "soba:revising"));
    }

    #[test]
    fn nil_and_unprefixed_rejected() {
        assert!(!validate_transition("", ""));
        assert!(!validate_transition("todo", "planning"));
        assert!(!validate_transition("soba:todo", "not-a-label"));
    }

    #[test]
    fn label_round_trips_through_parse() {
        for label in Label::all() {
            assert_eq!(Label::parse(label.as_str()), Some(label));
        }
    }

    #[test]
    fn all_has_twelve_labels() {
        assert_eq!(Label::all().len(), 12);
    }
}
