//! Research-project phase timeline engine.
//!
//! A project's schedule is split into five fixed phases. Given a start and
//! end date the engine derives per-phase durations from a fixed proportion
//! table (calibrated against a 140-day reference project), and projects the
//! phases onto the calendar to compute per-phase and overall progress as of
//! an injected `now`.
//!
//! Everything here is pure: callers load the project, run these functions,
//! and persist the result themselves.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const MS_PER_DAY: f64 = 86_400_000.0;

/// The five phase keys, in canonical order. The order is significant: each
/// phase starts where the previous one ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhaseKey {
    ProjectPlanning,
    ResearchPhase,
    DataCollection,
    AnalysisPhase,
    FinalReport,
}

impl PhaseKey {
    pub const ALL: [PhaseKey; 5] = [
        PhaseKey::ProjectPlanning,
        PhaseKey::ResearchPhase,
        PhaseKey::DataCollection,
        PhaseKey::AnalysisPhase,
        PhaseKey::FinalReport,
    ];

    pub fn title(self) -> &'static str {
        match self {
            PhaseKey::ProjectPlanning => "Project Planning",
            PhaseKey::ResearchPhase => "Research Phase",
            PhaseKey::DataCollection => "Data Collection",
            PhaseKey::AnalysisPhase => "Analysis Phase",
            PhaseKey::FinalReport => "Final Report",
        }
    }

    /// Share of the total duration allotted to this phase.
    /// Planning 14/140, research 30/140, data collection 45/140,
    /// analysis 30/140, final report 21/140.
    pub fn proportion(self) -> f64 {
        match self {
            PhaseKey::ProjectPlanning => 0.10,
            PhaseKey::ResearchPhase => 0.214,
            PhaseKey::DataCollection => 0.321,
            PhaseKey::AnalysisPhase => 0.214,
            PhaseKey::FinalReport => 0.151,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub title: String,
    pub duration: i64,
    pub saved: bool,
}

/// Fixed-key mapping of the five phases. Phases can never be added or
/// removed, so this is a plain struct rather than a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSet {
    pub project_planning: Phase,
    pub research_phase: Phase,
    pub data_collection: Phase,
    pub analysis_phase: Phase,
    pub final_report: Phase,
}

impl PhaseSet {
    pub fn get(&self, key: PhaseKey) -> &Phase {
        match key {
            PhaseKey::ProjectPlanning => &self.project_planning,
            PhaseKey::ResearchPhase => &self.research_phase,
            PhaseKey::DataCollection => &self.data_collection,
            PhaseKey::AnalysisPhase => &self.analysis_phase,
            PhaseKey::FinalReport => &self.final_report,
        }
    }

    pub fn get_mut(&mut self, key: PhaseKey) -> &mut Phase {
        match key {
            PhaseKey::ProjectPlanning => &mut self.project_planning,
            PhaseKey::ResearchPhase => &mut self.research_phase,
            PhaseKey::DataCollection => &mut self.data_collection,
            PhaseKey::AnalysisPhase => &mut self.analysis_phase,
            PhaseKey::FinalReport => &mut self.final_report,
        }
    }

    /// Phases in canonical order.
    pub fn entries(&self) -> impl Iterator<Item = (PhaseKey, &Phase)> {
        PhaseKey::ALL.iter().map(move |&key| (key, self.get(key)))
    }

    pub fn total_days(&self) -> i64 {
        self.entries().map(|(_, phase)| phase.duration).sum()
    }

    /// Returns a copy with every phase marked as saved.
    pub fn saved(&self) -> PhaseSet {
        let mut phases = self.clone();
        for key in PhaseKey::ALL {
            phases.get_mut(key).saved = true;
        }
        phases
    }
}

impl Default for PhaseSet {
    /// The stock durations of the 140-day reference project, used when a
    /// project has no dates to derive a split from.
    fn default() -> Self {
        let phase = |key: PhaseKey, duration: i64| Phase {
            title: key.title().to_string(),
            duration,
            saved: false,
        };
        PhaseSet {
            project_planning: phase(PhaseKey::ProjectPlanning, 14),
            research_phase: phase(PhaseKey::ResearchPhase, 30),
            data_collection: phase(PhaseKey::DataCollection, 45),
            analysis_phase: phase(PhaseKey::AnalysisPhase, 30),
            final_report: phase(PhaseKey::FinalReport, 21),
        }
    }
}

/// The persisted timeline structure embedded in a research project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub phases: PhaseSet,
    pub total_duration: i64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl Timeline {
    /// Rebuilds the derived fields from a phase set: the total duration is
    /// the sum of the phase durations and the end date follows from the
    /// start date. Phase edits go through this so a stale total can never
    /// be observed.
    pub fn from_phases(phases: PhaseSet, start_date: Option<DateTime<Utc>>) -> Timeline {
        let total_duration = phases.total_days();
        let end_date = start_date.map(|start| start + Duration::days(total_duration));
        Timeline {
            phases,
            total_duration,
            start_date,
            end_date,
        }
    }
}

/// Derives the five phase durations from a project's date span.
///
/// `total_days` is the span in days, rounded up. Each phase gets its
/// proportional share (rounded, floored at one day); the rounding residue
/// is folded into the data-collection phase, which is then re-clamped to a
/// minimum of one day. For spans of at least five days the durations sum
/// exactly to `total_days`; below that the per-phase floor can break the
/// sum, which is kept as-is (see the tests).
///
/// An end date at or before the start date is not rejected here: it yields
/// degenerate one-day phases, matching the behavior this engine replaces.
pub fn derive_phases(start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Timeline {
    let total_ms = (end_date - start_date).num_milliseconds();
    let total_days = (total_ms as f64 / MS_PER_DAY).ceil() as i64;

    let phase = |key: PhaseKey| Phase {
        title: key.title().to_string(),
        duration: ((total_days as f64 * key.proportion()).round() as i64).max(1),
        saved: false,
    };

    let mut phases = PhaseSet {
        project_planning: phase(PhaseKey::ProjectPlanning),
        research_phase: phase(PhaseKey::ResearchPhase),
        data_collection: phase(PhaseKey::DataCollection),
        analysis_phase: phase(PhaseKey::AnalysisPhase),
        final_report: phase(PhaseKey::FinalReport),
    };

    // Fold the rounding difference into the largest-share phase.
    let calculated_total = phases.total_days();
    if calculated_total != total_days {
        let difference = total_days - calculated_total;
        let data_collection = phases.get_mut(PhaseKey::DataCollection);
        data_collection.duration = (data_collection.duration + difference).max(1);
    }

    Timeline {
        phases,
        total_duration: total_days,
        start_date: Some(start_date),
        end_date: Some(end_date),
    }
}

/// Replaces a single phase's duration, marking that phase as unsaved and
/// leaving the rest untouched. Rejects non-positive durations without
/// modifying anything. Pair with [`Timeline::from_phases`] (or
/// [`project`]) to refresh the derived totals — the route layer does both
/// in one step.
pub fn apply_duration_edit(
    phases: &PhaseSet,
    key: PhaseKey,
    new_duration: i64,
) -> Result<PhaseSet> {
    if new_duration <= 0 {
        return Err(AppError::Validation(
            "Phase duration must be a positive number of days".to_string(),
        ));
    }

    let mut updated = phases.clone();
    let phase = updated.get_mut(key);
    phase.duration = new_duration;
    phase.saved = false;
    Ok(updated)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedPhase {
    pub title: String,
    pub duration: i64,
    pub saved: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub progress: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedPhaseSet {
    pub project_planning: ProjectedPhase,
    pub research_phase: ProjectedPhase,
    pub data_collection: ProjectedPhase,
    pub analysis_phase: ProjectedPhase,
    pub final_report: ProjectedPhase,
}

/// A timeline projected onto the calendar: concrete phase dates plus
/// progress percentages as of `now`. Never persisted as-is; recomputed on
/// demand from the phase durations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedTimeline {
    pub total_duration: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub current_progress: i64,
    pub phase_timeline: ProjectedPhaseSet,
}

/// Elapsed share of `[start, end]` as a percentage, clamped to `[0, 100]`.
/// `now` exactly at `end` counts as 100.
fn span_progress(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    if now < start {
        return 0;
    }
    if now > end {
        return 100;
    }
    let span = (end - start).num_milliseconds();
    if span <= 0 {
        return 100;
    }
    let elapsed = (now - start).num_milliseconds();
    (((elapsed as f64 / span as f64) * 100.0).round() as i64).clamp(0, 100)
}

/// Projects a phase set onto the calendar from `start_date`.
///
/// Phases are laid out in canonical order; each starts at the running
/// cumulative offset from the project start. `now` is injected so the
/// computation stays deterministic and testable.
pub fn project(phases: &PhaseSet, start_date: DateTime<Utc>, now: DateTime<Utc>) -> ProjectedTimeline {
    let total_duration = phases.total_days();
    let end_date = start_date + Duration::days(total_duration);

    let mut cumulative_days = 0i64;
    let mut projected = |key: PhaseKey| {
        let phase = phases.get(key);
        let phase_start = start_date + Duration::days(cumulative_days);
        let phase_end = phase_start + Duration::days(phase.duration);
        cumulative_days += phase.duration;
        ProjectedPhase {
            title: phase.title.clone(),
            duration: phase.duration,
            saved: phase.saved,
            start_date: phase_start,
            end_date: phase_end,
            progress: span_progress(phase_start, phase_end, now),
        }
    };

    let phase_timeline = ProjectedPhaseSet {
        project_planning: projected(PhaseKey::ProjectPlanning),
        research_phase: projected(PhaseKey::ResearchPhase),
        data_collection: projected(PhaseKey::DataCollection),
        analysis_phase: projected(PhaseKey::AnalysisPhase),
        final_report: projected(PhaseKey::FinalReport),
    };

    ProjectedTimeline {
        total_duration,
        start_date,
        end_date,
        current_progress: span_progress(start_date, end_date, now),
        phase_timeline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn phase(set: &ProjectedPhaseSet, key: PhaseKey) -> &ProjectedPhase {
        match key {
            PhaseKey::ProjectPlanning => &set.project_planning,
            PhaseKey::ResearchPhase => &set.research_phase,
            PhaseKey::DataCollection => &set.data_collection,
            PhaseKey::AnalysisPhase => &set.analysis_phase,
            PhaseKey::FinalReport => &set.final_report,
        }
    }

    #[test]
    fn derives_reference_project_split() {
        // 140-day span: the proportions were calibrated against this.
        let timeline = derive_phases(date(2025, 1, 1), date(2025, 5, 21));

        assert_eq!(timeline.total_duration, 140);
        assert_eq!(timeline.phases.project_planning.duration, 14);
        assert_eq!(timeline.phases.research_phase.duration, 30);
        assert_eq!(timeline.phases.data_collection.duration, 45);
        assert_eq!(timeline.phases.analysis_phase.duration, 30);
        assert_eq!(timeline.phases.final_report.duration, 21);
        assert_eq!(timeline.phases.total_days(), 140);
        assert!(timeline.phases.entries().all(|(_, p)| !p.saved));
    }

    #[test]
    fn durations_sum_to_total_for_spans_of_five_days_or_more() {
        let start = date(2025, 1, 1);
        for days in 5..=730 {
            let timeline = derive_phases(start, start + Duration::days(days));
            assert_eq!(timeline.total_duration, days);
            assert_eq!(
                timeline.phases.total_days(),
                days,
                "sum mismatch for a {days}-day span"
            );
            assert!(timeline.phases.entries().all(|(_, p)| p.duration >= 1));
        }
    }

    #[test]
    fn partial_day_spans_round_up() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 11, 18, 0, 0).unwrap();
        // 10.5 days of wall clock => 11 total days
        assert_eq!(derive_phases(start, end).total_duration, 11);
    }

    #[test]
    fn tiny_spans_keep_phase_floor_but_break_the_sum() {
        // Below five days the one-day floor on each phase beats the
        // reconciliation step. The per-phase floor still holds; the exact
        // sum does not, and that is accepted behavior.
        for days in 0..5 {
            let start = date(2025, 1, 1);
            let timeline = derive_phases(start, start + Duration::days(days));
            assert!(timeline.phases.entries().all(|(_, p)| p.duration >= 1));
            assert!(timeline.phases.total_days() >= 5);
            assert_ne!(timeline.phases.total_days(), days);
        }
    }

    #[test]
    fn end_before_start_is_not_rejected() {
        // Deliberate: an inverted span passes through and degenerates to
        // one-day phases rather than erroring.
        let timeline = derive_phases(date(2025, 5, 21), date(2025, 1, 1));
        assert!(timeline.total_duration < 0);
        assert!(timeline.phases.entries().all(|(_, p)| p.duration == 1));
    }

    #[test]
    fn projection_lays_phases_end_to_end() {
        let start = date(2025, 1, 1);
        let timeline = derive_phases(start, date(2025, 5, 21));
        let projected = project(&timeline.phases, start, start);

        let mut expected_start = start;
        for key in PhaseKey::ALL {
            let p = phase(&projected.phase_timeline, key);
            assert_eq!(p.start_date, expected_start);
            assert_eq!(p.end_date, p.start_date + Duration::days(p.duration));
            expected_start = p.end_date;
        }
        assert_eq!(projected.end_date, expected_start);
        assert_eq!(projected.total_duration, 140);
    }

    #[test]
    fn progress_is_zero_before_start_and_full_after_end() {
        let start = date(2025, 1, 1);
        let timeline = derive_phases(start, date(2025, 5, 21));

        let before = project(&timeline.phases, start, start - Duration::days(10));
        assert_eq!(before.current_progress, 0);
        for key in PhaseKey::ALL {
            assert_eq!(phase(&before.phase_timeline, key).progress, 0);
        }

        let after = project(&timeline.phases, start, start + Duration::days(500));
        assert_eq!(after.current_progress, 100);
        for key in PhaseKey::ALL {
            assert_eq!(phase(&after.phase_timeline, key).progress, 100);
        }
    }

    #[test]
    fn progress_at_exact_phase_end_is_full() {
        let start = date(2025, 1, 1);
        let timeline = derive_phases(start, date(2025, 5, 21));
        let planning_end = start + Duration::days(14);

        let projected = project(&timeline.phases, start, planning_end);
        assert_eq!(projected.phase_timeline.project_planning.progress, 100);
        // The next phase starts at the same instant and has elapsed nothing.
        assert_eq!(projected.phase_timeline.research_phase.progress, 0);
    }

    #[test]
    fn progress_is_monotonic_in_now() {
        let start = date(2025, 1, 1);
        let timeline = derive_phases(start, date(2025, 5, 21));

        let mut last_overall = 0;
        let mut last_per_phase = [0i64; 5];
        for hours in (0..(150 * 24)).step_by(7) {
            let now = start + Duration::hours(hours);
            let projected = project(&timeline.phases, start, now);
            assert!(projected.current_progress >= last_overall);
            last_overall = projected.current_progress;
            for (i, key) in PhaseKey::ALL.iter().enumerate() {
                let progress = phase(&projected.phase_timeline, *key).progress;
                assert!(progress >= last_per_phase[i]);
                assert!((0..=100).contains(&progress));
                last_per_phase[i] = progress;
            }
        }
    }

    #[test]
    fn midpoint_progress_rounds_to_half() {
        let start = date(2025, 1, 1);
        let timeline = derive_phases(start, start + Duration::days(100));
        let projected = project(&timeline.phases, start, start + Duration::days(50));
        assert_eq!(projected.current_progress, 50);
    }

    #[test]
    fn duration_edit_touches_only_the_named_phase() {
        let start = date(2025, 1, 1);
        let timeline = derive_phases(start, date(2025, 5, 21));
        let saved = timeline.phases.saved();

        let edited = apply_duration_edit(&saved, PhaseKey::DataCollection, 60).unwrap();
        assert_eq!(edited.data_collection.duration, 60);
        assert!(!edited.data_collection.saved);
        assert_eq!(edited.project_planning, saved.project_planning);
        assert_eq!(edited.research_phase, saved.research_phase);
        assert_eq!(edited.analysis_phase, saved.analysis_phase);
        assert_eq!(edited.final_report, saved.final_report);
    }

    #[test]
    fn duration_edit_alone_leaves_totals_stale_until_recomputed() {
        let start = date(2025, 1, 1);
        let timeline = derive_phases(start, date(2025, 5, 21));
        assert_eq!(timeline.total_duration, 140);

        // The edit itself does not touch the timeline's totals...
        let edited = apply_duration_edit(&timeline.phases, PhaseKey::DataCollection, 60).unwrap();
        assert_eq!(timeline.total_duration, 140);

        // ...recomputing from the edited phases is what refreshes them.
        let recomputed = Timeline::from_phases(edited, timeline.start_date);
        assert_eq!(recomputed.total_duration, 155);
        assert_eq!(
            recomputed.end_date,
            Some(start + Duration::days(155))
        );
    }

    #[test]
    fn non_positive_duration_edit_is_rejected_without_change() {
        let start = date(2025, 1, 1);
        let timeline = derive_phases(start, date(2025, 5, 21));

        for bad in [0, -1, -45] {
            let err = apply_duration_edit(&timeline.phases, PhaseKey::ResearchPhase, bad);
            assert!(matches!(err, Err(AppError::Validation(_))));
        }
        // The input set is untouched by construction (the edit clones), so
        // re-deriving gives the same durations.
        assert_eq!(timeline.phases.research_phase.duration, 30);
    }

    #[test]
    fn marking_saved_is_idempotent() {
        let timeline = derive_phases(date(2025, 1, 1), date(2025, 5, 21));
        let once = timeline.phases.saved();
        let twice = once.saved();
        assert_eq!(once, twice);
        assert!(once.entries().all(|(_, p)| p.saved));
    }

    #[test]
    fn phase_set_serializes_with_fixed_camel_case_keys() {
        let timeline = derive_phases(date(2025, 1, 1), date(2025, 5, 21));
        let value = serde_json::to_value(&timeline.phases).unwrap();
        for key in [
            "projectPlanning",
            "researchPhase",
            "dataCollection",
            "analysisPhase",
            "finalReport",
        ] {
            assert!(value.get(key).is_some(), "missing phase key {key}");
        }
        assert_eq!(value["projectPlanning"]["title"], "Project Planning");
    }
}
