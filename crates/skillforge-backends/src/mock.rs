//! Mock grading backend for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use skillforge_core::model::{CriterionScore, Feedback, Rubric, RubricCriterion};
use skillforge_core::traits::{AssessRequest, AssessResponse, GradingBackend, GradingStrategy};

/// A canned verdict the mock hands back.
#[derive(Debug, Clone)]
pub struct CannedAssessment {
    pub score: u32,
    pub max_score: u32,
    pub confidence: f64,
    /// Confidence stamped on the rubric itself (drives weak-rubric caching).
    pub rubric_confidence: f64,
    pub summary: String,
}

impl CannedAssessment {
    pub fn new(score: u32, max_score: u32, confidence: f64) -> Self {
        Self {
            score,
            max_score,
            confidence,
            rubric_confidence: 0.9,
            summary: "mock verdict".into(),
        }
    }

    fn to_response(&self, request: &AssessRequest) -> AssessResponse {
        let rubric = request.rubric.clone().unwrap_or_else(|| Rubric {
            criteria: vec![RubricCriterion {
                name: "overall".into(),
                max_score: self.max_score,
                guidance: String::new(),
            }],
            confidence: self.rubric_confidence,
        });
        AssessResponse {
            rubric_scores: vec![CriterionScore {
                criterion: "overall".into(),
                score: self.score,
                max_score: self.max_score,
                feedback: None,
            }],
            rubric,
            confidence: self.confidence,
            feedback: Feedback {
                summary: self.summary.clone(),
                ..Default::default()
            },
        }
    }
}

/// A mock grading backend that matches canned verdicts against the student
/// response, with optional latency and a strict-strategy override for
/// escalation tests.
pub struct MockGrader {
    /// Map of response substring -> canned verdict.
    responses: HashMap<String, CannedAssessment>,
    /// Verdict when nothing matches.
    default_response: CannedAssessment,
    /// Verdict returned for `GradingStrategy::Strict` passes, if set.
    strict_response: Option<CannedAssessment>,
    /// Artificial latency before answering.
    delay: Option<Duration>,
    call_count: AtomicU32,
    last_request: Mutex<Option<AssessRequest>>,
}

impl MockGrader {
    /// Create a mock with the given response-substring -> verdict mappings.
    pub fn new(responses: HashMap<String, CannedAssessment>) -> Self {
        Self {
            responses,
            default_response: CannedAssessment::new(0, 10, 0.9),
            strict_response: None,
            delay: None,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same verdict.
    pub fn with_fixed(score: u32, max_score: u32, confidence: f64) -> Self {
        let mut mock = Self::new(HashMap::new());
        mock.default_response = CannedAssessment::new(score, max_score, confidence);
        mock
    }

    /// Sleep this long before each verdict.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Return this verdict for strict-strategy passes.
    pub fn with_strict_response(mut self, canned: CannedAssessment) -> Self {
        self.strict_response = Some(canned);
        self
    }

    /// Stamp every constructed rubric with this confidence.
    pub fn with_rubric_confidence(mut self, confidence: f64) -> Self {
        self.default_response.rubric_confidence = confidence;
        self
    }

    /// Number of assess calls made.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// The most recent request received.
    pub fn last_request(&self) -> Option<AssessRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl GradingBackend for MockGrader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn assess(&self, request: &AssessRequest) -> anyhow::Result<AssessResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap() = Some(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if request.strategy == GradingStrategy::Strict {
            if let Some(strict) = &self.strict_response {
                return Ok(strict.to_response(request));
            }
        }

        let canned = self
            .responses
            .iter()
            .find(|(key, _)| request.student_response.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        Ok(canned.to_response(request))
    }
}
