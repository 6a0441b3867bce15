use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::recommend::config::PriorityParams;
use crate::recommend::skill_graph::SkillGraph;
use crate::recommend::types::{LearningAnalysis, PriorityArea, PriorityAreaType, Urgency};

const GAP_MINUTES_PER_POINT: f64 = 60.0;
const STRUGGLE_MINUTES_PER_ERROR: f64 = 5.0;
const GOAL_MINUTES: f64 = 15.0;

pub struct PriorityAreaIdentifier {
    params: PriorityParams,
    graph: Arc<SkillGraph>,
}

impl PriorityAreaIdentifier {
    pub fn new(params: PriorityParams, graph: Arc<SkillGraph>) -> Self {
        Self { params, graph }
    }

    pub fn identify(&self, analysis: &LearningAnalysis) -> Vec<PriorityArea> {
        let mut areas = self.knowledge_gaps(analysis);
        areas.extend(self.recent_struggles(analysis));
        areas.extend(self.goal_alignment(analysis));

        let flagged: BTreeSet<String> = areas.iter().map(|a| a.identifier.clone()).collect();
        areas.extend(self.prerequisite_gaps(analysis, &flagged));

        let merged = merge_priority_areas(areas);
        tracing::debug!(areas = merged.len(), "priority areas identified");
        merged
    }

    fn knowledge_gaps(&self, analysis: &LearningAnalysis) -> Vec<PriorityArea> {
        let threshold = self.params.knowledge_gap_threshold;
        analysis
            .masteries
            .iter()
            .filter(|(_, m)| **m < threshold)
            .map(|(skill, m)| {
                let urgency = if *m < self.params.high_urgency_mastery {
                    Urgency::High
                } else {
                    Urgency::Medium
                };
                PriorityArea {
                    area_type: PriorityAreaType::Skill,
                    identifier: skill.clone(),
                    priority: (threshold - m) * 2.0,
                    reasons: vec![format!("mastery {:.2} below {:.2}", m, threshold)],
                    urgency,
                    time_investment_minutes: (threshold - m) * GAP_MINUTES_PER_POINT,
                    prerequisites: self.graph.prerequisites_of(skill).to_vec(),
                }
            })
            .collect()
    }

    fn recent_struggles(&self, analysis: &LearningAnalysis) -> Vec<PriorityArea> {
        analysis
            .recent_errors
            .iter()
            .filter(|(_, errors)| **errors >= self.params.struggle_min_errors)
            .map(|(skill, errors)| {
                let urgency = if *errors >= self.params.struggle_high_errors {
                    Urgency::High
                } else {
                    Urgency::Medium
                };
                PriorityArea {
                    area_type: PriorityAreaType::Skill,
                    identifier: skill.clone(),
                    priority: *errors as f64 * self.params.struggle_weight,
                    reasons: vec![format!("{} recent incorrect attempts", errors)],
                    urgency,
                    time_investment_minutes: *errors as f64 * STRUGGLE_MINUTES_PER_ERROR,
                    prerequisites: self.graph.prerequisites_of(skill).to_vec(),
                }
            })
            .collect()
    }

    fn goal_alignment(&self, analysis: &LearningAnalysis) -> Vec<PriorityArea> {
        let mut areas = Vec::new();
        for goal in &analysis.goals {
            for skill in self.graph.skills_for_goal(goal) {
                let mastery = analysis.mastery_or(&skill, 0.0);
                if mastery >= self.params.goal_mastery_threshold {
                    continue;
                }
                areas.push(PriorityArea {
                    area_type: PriorityAreaType::Goal,
                    prerequisites: self.graph.prerequisites_of(&skill).to_vec(),
                    identifier: skill,
                    priority: self.params.goal_priority,
                    reasons: vec![format!("supports goal \"{}\"", goal)],
                    urgency: Urgency::Medium,
                    time_investment_minutes: GOAL_MINUTES,
                });
            }
        }
        areas
    }

    /// One entry per weak prerequisite, reached from any skill the learner is working on.
    fn prerequisite_gaps(
        &self,
        analysis: &LearningAnalysis,
        flagged: &BTreeSet<String>,
    ) -> Vec<PriorityArea> {
        let mut working: BTreeSet<&str> = flagged.iter().map(String::as_str).collect();
        working.extend(
            analysis
                .masteries
                .iter()
                .filter(|(_, m)| **m < self.params.prerequisite_target)
                .map(|(skill, _)| skill.as_str()),
        );

        let threshold = self.params.prerequisite_threshold;
        let mut found: BTreeMap<String, PriorityArea> = BTreeMap::new();

        for dependent in working {
            let mut visited = BTreeSet::new();
            visited.insert(dependent.to_string());
            let mut stack: Vec<String> = self.graph.prerequisites_of(dependent).to_vec();

            while let Some(prerequisite) = stack.pop() {
                if !visited.insert(prerequisite.clone()) {
                    continue;
                }
                let mastery = analysis.mastery_or(&prerequisite, 0.0);
                if mastery >= threshold {
                    continue;
                }
                stack.extend(self.graph.prerequisites_of(&prerequisite).iter().cloned());

                let reason = format!("prerequisite for {}", dependent);
                match found.get_mut(&prerequisite) {
                    Some(area) => {
                        if !area.reasons.contains(&reason) {
                            area.reasons.push(reason);
                        }
                    }
                    None => {
                        found.insert(
                            prerequisite.clone(),
                            PriorityArea {
                                area_type: PriorityAreaType::Prerequisite,
                                prerequisites: self.graph.prerequisites_of(&prerequisite).to_vec(),
                                identifier: prerequisite,
                                priority: (threshold - mastery) * 2.0
                                    + self.params.prerequisite_base_priority,
                                reasons: vec![reason],
                                urgency: Urgency::High,
                                time_investment_minutes: (threshold - mastery)
                                    * GAP_MINUTES_PER_POINT,
                            },
                        );
                    }
                }
            }
        }

        found.into_values().collect()
    }
}

/// Collapse entries sharing `(area_type, identifier)` and sort by priority, then urgency.
pub fn merge_priority_areas(areas: Vec<PriorityArea>) -> Vec<PriorityArea> {
    let mut merged: BTreeMap<(PriorityAreaType, String), PriorityArea> = BTreeMap::new();
    for area in areas {
        let key = (area.area_type, area.identifier.clone());
        match merged.get_mut(&key) {
            Some(existing) => existing.absorb(area),
            None => {
                merged.insert(key, area);
            }
        }
    }

    let mut out: Vec<PriorityArea> = merged.into_values().collect();
    out.sort_by(|a, b| {
        b.priority
            .total_cmp(&a.priority)
            .then_with(|| b.urgency.cmp(&a.urgency))
            .then_with(|| a.identifier.cmp(&b.identifier))
            .then_with(|| a.area_type.cmp(&b.area_type))
    });
    out
}
