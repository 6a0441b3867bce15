use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{
    MasteryRepository, Question, QuestionQuery, QuestionRepository, RepositoryError,
    UserQuestionAnalytics,
};
use crate::recommend::types::SkillMastery;

/// Catalog held in memory, with switches for simulating an unhealthy backend.
#[derive(Default)]
pub struct InMemoryQuestionStore {
    questions: RwLock<BTreeMap<String, Question>>,
    analytics: RwLock<HashMap<(String, String), UserQuestionAnalytics>>,
    failing: AtomicBool,
    latency: Option<Duration>,
    queries: AtomicU64,
}

impl InMemoryQuestionStore {
    pub fn new(questions: impl IntoIterator<Item = Question>) -> Self {
        let store = Self::default();
        for question in questions {
            store.insert(question);
        }
        store
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, question: Question) {
        self.questions.write().insert(question.id.clone(), question);
    }

    pub fn clear(&self) {
        self.questions.write().clear();
    }

    pub fn len(&self) -> usize {
        self.questions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.read().is_empty()
    }

    pub fn set_analytics(&self, user_id: &str, question_id: &str, analytics: UserQuestionAnalytics) {
        self.analytics
            .write()
            .insert((user_id.to_string(), question_id.to_string()), analytics);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    async fn enter(&self) -> Result<(), RepositoryError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "question store offline".to_string(),
            ));
        }
        Ok(())
    }
}

fn matches(question: &Question, query: &QuestionQuery) -> bool {
    if let Some(subject) = &query.subject {
        if !question.subject.eq_ignore_ascii_case(subject) {
            return false;
        }
    }
    if let Some(band) = query.difficulty {
        if question.difficulty != band {
            return false;
        }
    }
    if !query.skills.is_empty() && !question.skills.iter().any(|s| query.skills.contains(s)) {
        return false;
    }
    !query.exclude_ids.contains(&question.id)
}

#[async_trait]
impl QuestionRepository for InMemoryQuestionStore {
    async fn fetch_questions(&self, query: &QuestionQuery) -> Result<Vec<Question>, RepositoryError> {
        self.enter().await?;

        let mut found: Vec<Question> = self
            .questions
            .read()
            .values()
            .filter(|q| matches(q, query))
            .cloned()
            .collect();

        // Never-used questions first, then the least recently used.
        found.sort_by(|a, b| {
            a.last_used_at
                .cmp(&b.last_used_at)
                .then_with(|| a.usage_count.cmp(&b.usage_count))
                .then_with(|| a.id.cmp(&b.id))
        });
        if query.limit > 0 {
            found.truncate(query.limit);
        }
        Ok(found)
    }

    async fn fetch_questions_by_ids(&self, ids: &[String]) -> Result<Vec<Question>, RepositoryError> {
        self.enter().await?;
        let questions = self.questions.read();
        Ok(ids.iter().filter_map(|id| questions.get(id).cloned()).collect())
    }

    async fn fetch_user_question_analytics(
        &self,
        user_id: &str,
        question_ids: &[String],
    ) -> Result<HashMap<String, UserQuestionAnalytics>, RepositoryError> {
        self.enter().await?;
        let analytics = self.analytics.read();
        Ok(question_ids
            .iter()
            .filter_map(|id| {
                analytics
                    .get(&(user_id.to_string(), id.clone()))
                    .map(|a| (id.clone(), a.clone()))
            })
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryMasteryStore {
    masteries: RwLock<HashMap<String, BTreeMap<String, SkillMastery>>>,
    failing: AtomicBool,
}

impl InMemoryMasteryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mastery(&self, user_id: &str, mastery: SkillMastery) {
        self.masteries
            .write()
            .entry(user_id.to_string())
            .or_default()
            .insert(mastery.skill_id.clone(), mastery);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MasteryRepository for InMemoryMasteryStore {
    async fn fetch_skill_mastery(
        &self,
        user_id: &str,
    ) -> Result<BTreeMap<String, SkillMastery>, RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "mastery store offline".to_string(),
            ));
        }
        Ok(self
            .masteries
            .read()
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}
