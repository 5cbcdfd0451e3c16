use crate::narrative::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Intrusion categories tracked per client per day.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IntrusionCategory {
    Human,
    Vehicle,
    Animal,
    Unidentified,
}

impl IntrusionCategory {
    pub const ALL: [IntrusionCategory; 4] = [
        IntrusionCategory::Human,
        IntrusionCategory::Vehicle,
        IntrusionCategory::Animal,
        IntrusionCategory::Unidentified,
    ];

    pub fn label(self) -> &'static str {
        match self {
            IntrusionCategory::Human => "Human Intrusions",
            IntrusionCategory::Vehicle => "Vehicle Intrusions",
            IntrusionCategory::Animal => "Animal Activity",
            IntrusionCategory::Unidentified => "Unidentified Events",
        }
    }
}

/// Per-day counts for a week, plus the quality gauges. Counts are
/// non-negative integers; the gauges are percentages (0–100) and seconds.
/// No aggregation is stored; consumers sum on demand.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    counts: BTreeMap<IntrusionCategory, [u32; 7]>,
    pub ai_accuracy: f64,
    pub operational_uptime: f64,
    pub response_time_secs: f64,
}

impl MetricsSnapshot {
    pub fn count(&self, category: IntrusionCategory, day: Weekday) -> u32 {
        self.counts
            .get(&category)
            .map(|days| days[day.index()])
            .unwrap_or(0)
    }

    /// Weekly total for one category; missing categories total zero.
    pub fn weekly_total(&self, category: IntrusionCategory) -> u32 {
        self.counts
            .get(&category)
            .map(|days| days.iter().sum())
            .unwrap_or(0)
    }

    /// Total across all categories for one day.
    pub fn day_total(&self, day: Weekday) -> u32 {
        IntrusionCategory::ALL
            .iter()
            .map(|cat| self.count(*cat, day))
            .sum()
    }

    pub fn has_any_counts(&self) -> bool {
        self.counts.values().any(|days| days.iter().any(|v| *v > 0))
    }

    /// Merges a partial update. Only supplied keys are overwritten; every
    /// untouched (category, day) cell and gauge keeps its value.
    pub fn apply(&mut self, patch: &MetricsPatch) {
        for (category, days) in &patch.counts {
            let slot = self.counts.entry(*category).or_insert([0; 7]);
            for (day, value) in days {
                slot[day.index()] = *value;
            }
        }
        if let Some(value) = patch.ai_accuracy {
            self.ai_accuracy = value.clamp(0.0, 100.0);
        }
        if let Some(value) = patch.operational_uptime {
            self.operational_uptime = value.clamp(0.0, 100.0);
        }
        if let Some(value) = patch.response_time_secs {
            self.response_time_secs = value.max(0.0);
        }
    }
}

/// A partial metrics update. Absent keys mean "leave unchanged".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsPatch {
    counts: BTreeMap<IntrusionCategory, BTreeMap<Weekday, u32>>,
    pub ai_accuracy: Option<f64>,
    pub operational_uptime: Option<f64>,
    pub response_time_secs: Option<f64>,
}

impl MetricsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(mut self, category: IntrusionCategory, day: Weekday, value: u32) -> Self {
        self.counts.entry(category).or_default().insert(day, value);
        self
    }

    pub fn with_ai_accuracy(mut self, value: f64) -> Self {
        self.ai_accuracy = Some(value);
        self
    }

    pub fn with_operational_uptime(mut self, value: f64) -> Self {
        self.operational_uptime = Some(value);
        self
    }

    pub fn with_response_time(mut self, value: f64) -> Self {
        self.response_time_secs = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
            && self.ai_accuracy.is_none()
            && self.operational_uptime.is_none()
            && self.response_time_secs.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_updates_merge_in_call_order() {
        let mut snapshot = MetricsSnapshot::default();
        snapshot.apply(
            &MetricsPatch::new()
                .with_count(IntrusionCategory::Human, Weekday::Monday, 5)
                .with_ai_accuracy(97.5),
        );
        snapshot.apply(
            &MetricsPatch::new().with_count(IntrusionCategory::Vehicle, Weekday::Tuesday, 2),
        );
        // Last write per key wins; untouched keys survive.
        snapshot.apply(
            &MetricsPatch::new().with_count(IntrusionCategory::Human, Weekday::Monday, 3),
        );

        assert_eq!(snapshot.count(IntrusionCategory::Human, Weekday::Monday), 3);
        assert_eq!(
            snapshot.count(IntrusionCategory::Vehicle, Weekday::Tuesday),
            2
        );
        assert_eq!(snapshot.ai_accuracy, 97.5);
    }

    #[test]
    fn merge_never_drops_unrelated_categories() {
        let mut snapshot = MetricsSnapshot::default();
        snapshot.apply(
            &MetricsPatch::new()
                .with_count(IntrusionCategory::Human, Weekday::Monday, 4)
                .with_count(IntrusionCategory::Animal, Weekday::Sunday, 1),
        );
        snapshot.apply(
            &MetricsPatch::new().with_count(IntrusionCategory::Human, Weekday::Friday, 2),
        );

        assert_eq!(snapshot.count(IntrusionCategory::Human, Weekday::Monday), 4);
        assert_eq!(snapshot.count(IntrusionCategory::Animal, Weekday::Sunday), 1);
        assert_eq!(snapshot.weekly_total(IntrusionCategory::Human), 6);
    }

    #[test]
    fn gauges_are_clamped_to_their_domains() {
        let mut snapshot = MetricsSnapshot::default();
        snapshot.apply(
            &MetricsPatch::new()
                .with_ai_accuracy(140.0)
                .with_operational_uptime(-3.0)
                .with_response_time(-1.0),
        );
        assert_eq!(snapshot.ai_accuracy, 100.0);
        assert_eq!(snapshot.operational_uptime, 0.0);
        assert_eq!(snapshot.response_time_secs, 0.0);
    }

    #[test]
    fn totals_sum_across_the_week() {
        let mut snapshot = MetricsSnapshot::default();
        let mut patch = MetricsPatch::new();
        for (idx, day) in Weekday::ALL.into_iter().enumerate() {
            patch = patch.with_count(IntrusionCategory::Vehicle, day, idx as u32);
        }
        snapshot.apply(&patch);
        assert_eq!(snapshot.weekly_total(IntrusionCategory::Vehicle), 21);
        assert_eq!(snapshot.day_total(Weekday::Sunday), 6);
        assert!(snapshot.has_any_counts());
    }
}
