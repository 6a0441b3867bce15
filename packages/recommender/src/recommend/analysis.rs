use std::collections::BTreeMap;

use crate::recommend::config::AnalysisParams;
use crate::recommend::types::{
    EngagementTrend, LearnerState, LearningAnalysis, LearningContext, PerformanceRecord,
};

/// Turns a raw learner snapshot into the engine's `LearningAnalysis`.
pub struct SkillStateReader {
    params: AnalysisParams,
}

impl SkillStateReader {
    pub fn new(params: AnalysisParams) -> Self {
        Self { params }
    }

    pub fn read(&self, state: &LearnerState, context: &LearningContext) -> LearningAnalysis {
        let mut masteries = BTreeMap::new();
        let mut total_attempts = 0u32;

        for (skill_id, mastery) in &state.skill_masteries {
            let probability = mastery.mastery_probability;
            if !probability.is_finite() {
                tracing::warn!(skill_id = %skill_id, "non-finite mastery probability ignored");
                continue;
            }
            if !(0.0..=1.0).contains(&probability) {
                tracing::warn!(
                    skill_id = %skill_id,
                    probability,
                    "mastery probability outside [0, 1], clamping"
                );
            }
            if mastery.correct_attempts > mastery.total_attempts {
                tracing::warn!(
                    skill_id = %skill_id,
                    correct = mastery.correct_attempts,
                    total = mastery.total_attempts,
                    "correct attempts exceed total attempts"
                );
            }
            masteries.insert(skill_id.clone(), probability.clamp(0.0, 1.0));
            total_attempts = total_attempts.saturating_add(mastery.total_attempts);
        }

        let recent_window = self.recent_window(&state.recent_performance);
        let mut recent_attempts: BTreeMap<String, u32> = BTreeMap::new();
        let mut recent_errors: BTreeMap<String, u32> = BTreeMap::new();
        for record in &recent_window {
            *recent_attempts.entry(record.skill_id.clone()).or_insert(0) += 1;
            if !record.correct {
                *recent_errors.entry(record.skill_id.clone()).or_insert(0) += 1;
            }
        }

        let recent_accuracy = if recent_window.is_empty() {
            None
        } else {
            let correct = recent_window.iter().filter(|r| r.correct).count();
            Some(correct as f64 / recent_window.len() as f64)
        };

        let timed: Vec<f64> = recent_window
            .iter()
            .map(|r| r.response_time_seconds)
            .filter(|t| t.is_finite() && *t >= 0.0)
            .collect();
        let average_response_time_seconds = if timed.is_empty() {
            None
        } else {
            Some(timed.iter().sum::<f64>() / timed.len() as f64)
        };

        let engagement_trend = self.engagement_trend(&recent_window);

        LearningAnalysis {
            masteries,
            total_attempts,
            recent_window,
            recent_accuracy,
            recent_attempts,
            recent_errors,
            average_response_time_seconds,
            engagement_trend,
            goals: state.learning_goals.clone(),
            stress_level: context.stress_level.clamp(0.0, 1.0),
        }
    }

    fn recent_window(&self, records: &[PerformanceRecord]) -> Vec<PerformanceRecord> {
        let mut sorted = records.to_vec();
        sorted.sort_by_key(|r| r.timestamp);
        let skip = sorted.len().saturating_sub(self.params.recent_window);
        sorted.into_iter().skip(skip).collect()
    }

    fn engagement_trend(&self, window: &[PerformanceRecord]) -> EngagementTrend {
        if window.len() < self.params.trend_min_samples {
            return EngagementTrend::Stable;
        }

        let outcomes: Vec<f64> = window
            .iter()
            .map(|r| if r.correct { 1.0 } else { 0.0 })
            .collect();
        let slope = compute_slope(&outcomes);

        if slope > self.params.trend_up_threshold {
            EngagementTrend::Improving
        } else if slope < self.params.trend_down_threshold {
            EngagementTrend::Declining
        } else {
            EngagementTrend::Stable
        }
    }
}

impl Default for SkillStateReader {
    fn default() -> Self {
        Self::new(AnalysisParams::default())
    }
}

fn compute_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_xx: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();

    let denominator = n * sum_xx - sum_x.powi(2);
    if denominator.abs() < 1e-10 {
        return 0.0;
    }

    (n * sum_xy - sum_x * sum_y) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommend::types::SkillMastery;
    use chrono::{Duration, TimeZone, Utc};

    fn record(skill: &str, correct: bool, minute: i64) -> PerformanceRecord {
        PerformanceRecord {
            skill_id: skill.to_string(),
            correct,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minute),
            response_time_seconds: 20.0,
        }
    }

    #[test]
    fn clamps_out_of_range_mastery() {
        let mut state = LearnerState::default();
        state
            .skill_masteries
            .insert("fractions".to_string(), SkillMastery::new("fractions", 1.4).with_attempts(3, 5));
        state
            .skill_masteries
            .insert("geometry_basics".to_string(), SkillMastery::new("geometry_basics", f64::NAN));

        let analysis = SkillStateReader::default().read(&state, &LearningContext::default());
        assert_eq!(analysis.mastery("fractions"), Some(1.0));
        assert_eq!(analysis.mastery("geometry_basics"), None);
        assert_eq!(analysis.total_attempts, 3);
    }

    #[test]
    fn keeps_only_most_recent_fifteen_records() {
        let mut state = LearnerState::default();
        for minute in (0..20).rev() {
            state
                .recent_performance
                .push(record("fractions", minute >= 5, minute));
        }

        let analysis = SkillStateReader::default().read(&state, &LearningContext::default());
        assert_eq!(analysis.recent_window.len(), 15);
        assert_eq!(analysis.recent_errors.get("fractions"), None);
        assert_eq!(analysis.recent_accuracy, Some(1.0));
        assert!(analysis.recent_window.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn detects_declining_trend() {
        let mut state = LearnerState::default();
        for minute in 0..10 {
            state.recent_performance.push(record("fractions", minute < 4, minute));
        }

        let analysis = SkillStateReader::default().read(&state, &LearningContext::default());
        assert_eq!(analysis.engagement_trend, EngagementTrend::Declining);
        assert_eq!(analysis.recent_errors.get("fractions"), Some(&6));
    }

    #[test]
    fn short_history_is_stable() {
        let mut state = LearnerState::default();
        for minute in 0..3 {
            state.recent_performance.push(record("fractions", false, minute));
        }
        let analysis = SkillStateReader::default().read(&state, &LearningContext::default());
        assert_eq!(analysis.engagement_trend, EngagementTrend::Stable);
    }
}
