use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalMapping {
    pub keyword: String,
    pub skills: Vec<String>,
}

/// Prerequisite edges between skills and the keyword map used to turn goals into skills.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillGraph {
    prerequisites: BTreeMap<String, Vec<String>>,
    goals: Vec<GoalMapping>,
}

impl SkillGraph {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_prerequisites(mut self, skill: &str, prerequisites: &[&str]) -> Self {
        let entry = self.prerequisites.entry(skill.to_string()).or_default();
        for prerequisite in prerequisites {
            if *prerequisite != skill && !entry.iter().any(|p| p == prerequisite) {
                entry.push(prerequisite.to_string());
            }
        }
        self
    }

    pub fn with_goal(mut self, keyword: &str, skills: &[&str]) -> Self {
        self.goals.push(GoalMapping {
            keyword: keyword.to_lowercase(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn prerequisites_of(&self, skill: &str) -> &[String] {
        self.prerequisites
            .get(skill)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every skill reachable through prerequisite edges, nearest first. Cycles are tolerated.
    pub fn transitive_prerequisites(&self, skill: &str) -> Vec<String> {
        let mut visited = BTreeSet::new();
        visited.insert(skill.to_string());
        let mut ordered = Vec::new();
        let mut frontier: Vec<String> = self.prerequisites_of(skill).to_vec();

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for prerequisite in frontier {
                if visited.insert(prerequisite.clone()) {
                    next.extend(self.prerequisites_of(&prerequisite).iter().cloned());
                    ordered.push(prerequisite);
                }
            }
            frontier = next;
        }
        ordered
    }

    /// Skills for a free-text goal, matched by case-insensitive keyword containment.
    pub fn skills_for_goal(&self, goal: &str) -> Vec<String> {
        let goal = goal.to_lowercase();
        let mut skills = Vec::new();
        for mapping in &self.goals {
            if goal.contains(&mapping.keyword) {
                for skill in &mapping.skills {
                    if !skills.contains(skill) {
                        skills.push(skill.clone());
                    }
                }
            }
        }
        skills
    }
}

impl SkillGraph {
    pub fn standard() -> Self {
        Self::empty()
            .with_prerequisites("fractions", &["arithmetic_operations"])
            .with_prerequisites("algebra_linear", &["arithmetic_operations"])
            .with_prerequisites("algebra_quadratic", &["algebra_linear"])
            .with_prerequisites("geometry_basics", &["arithmetic_operations"])
            .with_prerequisites("statistics_basics", &["fractions"])
            .with_prerequisites("reading_inference", &["reading_comprehension"])
            .with_prerequisites("reading_comprehension", &["vocabulary"])
            .with_prerequisites("essay_structure", &["reading_comprehension"])
            .with_goal("algebra", &["algebra_linear", "algebra_quadratic"])
            .with_goal("geometry", &["geometry_basics"])
            .with_goal("reading", &["reading_comprehension", "reading_inference"])
            .with_goal("writing", &["essay_structure"])
            .with_goal("statistics", &["statistics_basics", "fractions"])
            .with_goal("math", &["arithmetic_operations", "fractions", "algebra_linear"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitive_walk_collects_chain() {
        let graph = SkillGraph::standard();
        assert_eq!(
            graph.transitive_prerequisites("algebra_quadratic"),
            vec!["algebra_linear".to_string(), "arithmetic_operations".to_string()]
        );
        assert!(graph.transitive_prerequisites("vocabulary").is_empty());
    }

    #[test]
    fn cycles_terminate() {
        let graph = SkillGraph::empty()
            .with_prerequisites("a", &["b"])
            .with_prerequisites("b", &["c"])
            .with_prerequisites("c", &["a"]);
        assert_eq!(graph.transitive_prerequisites("a"), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn goal_matching_ignores_case() {
        let graph = SkillGraph::standard();
        assert_eq!(
            graph.skills_for_goal("Master Algebra"),
            vec!["algebra_linear".to_string(), "algebra_quadratic".to_string()]
        );
        assert!(graph.skills_for_goal("learn chess").is_empty());
    }
}
