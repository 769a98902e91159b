//! In-memory question store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use skillforge_core::error::EngineError;
use skillforge_core::model::Question;
use skillforge_core::traits::QuestionStore;

/// HashMap-backed `QuestionStore` for tests and local runs.
#[derive(Default)]
pub struct MemoryQuestionStore {
    questions: Mutex<HashMap<String, Question>>,
}

impl MemoryQuestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store preloaded with the given questions.
    pub fn with_questions(questions: impl IntoIterator<Item = Question>) -> Self {
        let map = questions.into_iter().map(|q| (q.id.clone(), q)).collect();
        Self {
            questions: Mutex::new(map),
        }
    }

    /// Insert or replace a question.
    pub fn insert(&self, question: Question) {
        self.questions
            .lock()
            .unwrap()
            .insert(question.id.clone(), question);
    }
}

#[async_trait]
impl QuestionStore for MemoryQuestionStore {
    async fn resolve_question(&self, question_id: &str) -> Result<Question, EngineError> {
        self.questions
            .lock()
            .unwrap()
            .get(question_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("question {question_id}")))
    }
}
