//! Remote reasoning-service grading backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use skillforge_core::error::BackendError;
use skillforge_core::model::{CriterionScore, Feedback, Rubric};
use skillforge_core::traits::{AssessRequest, AssessResponse, GradingBackend};

const DEFAULT_BASE_URL: &str = "https://grader.skillforge.dev";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP client for the remote assessment API.
pub struct RemoteGrader {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl RemoteGrader {
    pub fn new(api_key: &str, base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");

        Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
        }
    }
}

#[derive(Deserialize)]
struct RemoteAssessment {
    criteria: Vec<RemoteCriterion>,
    rubric: Rubric,
    confidence: f64,
    #[serde(default)]
    feedback: Feedback,
}

#[derive(Deserialize)]
struct RemoteCriterion {
    name: String,
    score: u32,
    max_score: u32,
    #[serde(default)]
    feedback: Option<String>,
}

#[derive(Deserialize)]
struct RemoteError {
    error: RemoteErrorBody,
}

#[derive(Deserialize)]
struct RemoteErrorBody {
    message: String,
}

#[async_trait]
impl GradingBackend for RemoteGrader {
    fn name(&self) -> &str {
        "remote"
    }

    #[instrument(skip(self, request), fields(question_id = %request.question_id, strategy = ?request.strategy))]
    async fn assess(&self, request: &AssessRequest) -> anyhow::Result<AssessResponse> {
        let response = self
            .client
            .post(format!("{}/v1/assessments", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(DEFAULT_TIMEOUT_SECS)
                } else {
                    BackendError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5)
                * 1000;
            return Err(BackendError::RateLimited {
                retry_after_ms: retry_after,
            }
            .into());
        }
        if status == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::AuthenticationFailed(body).into());
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<RemoteError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(BackendError::ApiError { status, message }.into());
        }

        let assessment: RemoteAssessment =
            response.json().await.map_err(|e| BackendError::InvalidResponse(
                format!("failed to parse assessment: {e}"),
            ))?;

        if assessment.criteria.is_empty() {
            return Err(
                BackendError::InvalidResponse("assessment carried no criteria".into()).into(),
            );
        }

        let rubric_scores = assessment
            .criteria
            .into_iter()
            .map(|c| CriterionScore {
                criterion: c.name,
                score: c.score,
                max_score: c.max_score,
                feedback: c.feedback,
            })
            .collect();

        Ok(AssessResponse {
            rubric_scores,
            rubric: assessment.rubric,
            confidence: assessment.confidence,
            feedback: assessment.feedback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use skillforge_core::traits::GradingStrategy;

    fn request() -> AssessRequest {
        AssessRequest {
            question_id: "q1".into(),
            stem: "Explain photosynthesis.".into(),
            reference_answer: Some("Plants convert light into chemical energy.".into()),
            rubric: None,
            student_response: "Light becomes sugar.".into(),
            strategy: GradingStrategy::Standard,
        }
    }

    fn assessment_body() -> serde_json::Value {
        serde_json::json!({
            "criteria": [
                {"name": "accuracy", "score": 4, "max_score": 5, "feedback": "mostly right"},
                {"name": "completeness", "score": 2, "max_score": 5}
            ],
            "rubric": {
                "criteria": [
                    {"name": "accuracy", "max_score": 5, "guidance": "states the energy conversion"},
                    {"name": "completeness", "max_score": 5, "guidance": "mentions chlorophyll"}
                ],
                "confidence": 0.45
            },
            "confidence": 0.8,
            "feedback": {
                "summary": "Good grasp of the core idea.",
                "what_was_missing": ["role of chlorophyll"]
            }
        })
    }

    #[tokio::test]
    async fn successful_assessment() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/assessments"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(assessment_body()))
            .mount(&server)
            .await;

        let grader = RemoteGrader::new("test-key", Some(server.uri()));
        let response = grader.assess(&request()).await.unwrap();

        assert_eq!(response.rubric_scores.len(), 2);
        assert_eq!(response.rubric_scores[0].criterion, "accuracy");
        assert_eq!(response.rubric_scores[0].score, 4);
        assert_eq!(response.confidence, 0.8);
        assert_eq!(response.rubric.confidence, 0.45);
        assert_eq!(response.feedback.what_was_missing.len(), 1);
    }

    #[tokio::test]
    async fn authentication_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/assessments"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let grader = RemoteGrader::new("bad-key", Some(server.uri()));
        let err = grader.assess(&request()).await.unwrap_err();
        assert!(err.to_string().contains("authentication"));
    }

    #[tokio::test]
    async fn rate_limiting_carries_retry_after() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/assessments"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let grader = RemoteGrader::new("test-key", Some(server.uri()));
        let err = grader.assess(&request()).await.unwrap_err();
        let backend = err.downcast_ref::<BackendError>().unwrap();
        assert!(matches!(
            backend,
            BackendError::RateLimited {
                retry_after_ms: 7000
            }
        ));
    }

    #[tokio::test]
    async fn server_error_is_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/assessments"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": {"message": "grader overloaded"}
            })))
            .mount(&server)
            .await;

        let grader = RemoteGrader::new("test-key", Some(server.uri()));
        let err = grader.assess(&request()).await.unwrap_err();
        let backend = err.downcast_ref::<BackendError>().unwrap();
        match backend {
            BackendError::ApiError { status, message } => {
                assert_eq!(*status, 500);
                assert_eq!(message, "grader overloaded");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_criteria_is_invalid_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/assessments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "criteria": [],
                "rubric": {"criteria": [], "confidence": 0.2},
                "confidence": 0.2,
                "feedback": {"summary": ""}
            })))
            .mount(&server)
            .await;

        let grader = RemoteGrader::new("test-key", Some(server.uri()));
        let err = grader.assess(&request()).await.unwrap_err();
        let backend = err.downcast_ref::<BackendError>().unwrap();
        assert!(matches!(backend, BackendError::InvalidResponse(_)));
    }
}
