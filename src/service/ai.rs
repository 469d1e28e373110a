//! AI 相关度评分适配器
//!
//! 外部语义评分是可选信号：超时、网络错误、返回格式不对都只记录警告，
//! 调用方拿到空列表后按 AI 分 0 继续规则匹配。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::AiConfig;
use crate::models::{CandidateRecord, InvoiceMetadata};

/// 单个候选的 AI 评分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiScore {
    pub candidate_id: i64,
    pub score: u8,
    pub reasoning: String,
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed AI response: {0}")]
    Malformed(String),

    #[error("AI scoring timed out after {0:?}")]
    Timeout(Duration),
}

/// 外部语义评分接口，测试中可以注入 mock
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(
        &self,
        invoice: &InvoiceMetadata,
        candidates: &[CandidateRecord],
    ) -> Result<Vec<AiScore>, AiError>;
}

/// 未配置 API key 时使用：始终没有 AI 信号
#[derive(Debug, Default, Clone)]
pub struct DisabledScorer;

#[async_trait]
impl RelevanceScorer for DisabledScorer {
    async fn score(
        &self,
        _invoice: &InvoiceMetadata,
        _candidates: &[CandidateRecord],
    ) -> Result<Vec<AiScore>, AiError> {
        Ok(Vec::new())
    }
}

/// 根据配置构建评分器
pub fn scorer_from_config(config: &AiConfig) -> Arc<dyn RelevanceScorer> {
    match config.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => {
            tracing::info!("AI relevance scoring enabled, model {}", config.model);
            Arc::new(OpenAiRelevanceScorer::new(
                key.to_string(),
                config.model.clone(),
                config.endpoint.clone(),
            ))
        }
        _ => {
            tracing::info!("No AI API key configured, matching on rule-based scores only");
            Arc::new(DisabledScorer)
        }
    }
}

/// 带超时调用评分器，任何失败都降级为空列表
///
/// 返回结果中的候选 ID 必须都在 `candidates` 中且分数 <= 100，否则整个响应视为格式错误。
pub async fn score_with_timeout(
    scorer: &dyn RelevanceScorer,
    invoice: &InvoiceMetadata,
    candidates: &[CandidateRecord],
    timeout: Duration,
) -> Vec<AiScore> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let outcome = match tokio::time::timeout(timeout, scorer.score(invoice, candidates)).await {
        Ok(result) => result,
        Err(_) => Err(AiError::Timeout(timeout)),
    };

    match outcome.and_then(|scores| validate_scores(scores, candidates)) {
        Ok(scores) => {
            tracing::debug!("AI scored {} of {} candidates", scores.len(), candidates.len());
            scores
        }
        Err(e) => {
            tracing::warn!("AI relevance scoring unavailable, continuing without it: {}", e);
            Vec::new()
        }
    }
}

fn validate_scores(
    scores: Vec<AiScore>,
    candidates: &[CandidateRecord],
) -> Result<Vec<AiScore>, AiError> {
    let known: HashSet<i64> = candidates.iter().map(|c| c.id).collect();
    let mut seen = HashSet::new();
    let mut valid = Vec::with_capacity(scores.len());

    for score in scores {
        if !known.contains(&score.candidate_id) {
            return Err(AiError::Malformed(format!(
                "unknown candidate id {}",
                score.candidate_id
            )));
        }
        if score.score > 100 {
            return Err(AiError::Malformed(format!(
                "score {} for candidate {} out of range",
                score.score, score.candidate_id
            )));
        }
        // 重复 ID 以第一条为准
        if seen.insert(score.candidate_id) {
            valid.push(score);
        }
    }
    Ok(valid)
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    messages: Vec<Message>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct RelevancePayload {
    scores: Vec<RawScore>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScore {
    candidate_id: i64,
    score: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

/// 基于 chat completions 接口的评分器
pub struct OpenAiRelevanceScorer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiRelevanceScorer {
    pub fn new(api_key: String, model: String, endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            endpoint,
        }
    }

    async fn call(&self, user_prompt: String) -> Result<String, AiError> {
        let request = ChatRequest {
            model: self.model.clone(),
            temperature: 0.0,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_prompt(),
                },
                Message {
                    role: "user".to_string(),
                    content: user_prompt,
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status { status, body });
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| AiError::Malformed("empty choices".to_string()))
    }
}

#[async_trait]
impl RelevanceScorer for OpenAiRelevanceScorer {
    async fn score(
        &self,
        invoice: &InvoiceMetadata,
        candidates: &[CandidateRecord],
    ) -> Result<Vec<AiScore>, AiError> {
        let raw = self.call(user_prompt(invoice, candidates)?).await?;
        parse_relevance(&raw)
    }
}

/// 解析模型返回的 JSON 文本
pub fn parse_relevance(raw: &str) -> Result<Vec<AiScore>, AiError> {
    let payload: RelevancePayload =
        serde_json::from_str(raw).map_err(|e| AiError::Malformed(e.to_string()))?;

    payload
        .scores
        .into_iter()
        .map(|s| {
            if !s.score.is_finite() || s.score < 0.0 || s.score > 100.0 {
                return Err(AiError::Malformed(format!(
                    "score {} for candidate {} out of range",
                    s.score, s.candidate_id
                )));
            }
            Ok(AiScore {
                candidate_id: s.candidate_id,
                score: s.score.round() as u8,
                reasoning: s.reasoning.unwrap_or_default(),
            })
        })
        .collect()
}

fn user_prompt(invoice: &InvoiceMetadata, candidates: &[CandidateRecord]) -> Result<String, AiError> {
    let invoice_json =
        serde_json::to_string(invoice).map_err(|e| AiError::Malformed(e.to_string()))?;
    let candidates_json =
        serde_json::to_string(candidates).map_err(|e| AiError::Malformed(e.to_string()))?;
    Ok(format!(
        "Invoice metadata:\n{}\n\nCandidates:\n{}",
        invoice_json, candidates_json
    ))
}

fn system_prompt() -> String {
    r#"You rate how likely an invoice belongs to each candidate project or purchase order.
Return JSON only, in the form:
{"scores": [{"candidateId": <id>, "score": <0-100>, "reasoning": "<one sentence>"}]}
Score every candidate exactly once. Use only the candidate ids you were given.
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_payload() {
        let raw = r#"{"scores":[{"candidateId":3,"score":72.4,"reasoning":"same site"},{"candidateId":4,"score":10}]}"#;
        let scores = parse_relevance(raw).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].score, 72);
        assert_eq!(scores[0].reasoning, "same site");
        assert_eq!(scores[1].reasoning, "");
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(parse_relevance("not json"), Err(AiError::Malformed(_))));
        assert!(matches!(
            parse_relevance(r#"{"scores":[{"candidateId":1,"score":140}]}"#),
            Err(AiError::Malformed(_))
        ));
        assert!(matches!(parse_relevance(r#"{"result":[]}"#), Err(AiError::Malformed(_))));
    }

    #[tokio::test]
    async fn blank_key_disables_scoring() {
        let config = AiConfig {
            api_key: Some("   ".into()),
            ..Default::default()
        };
        let scorer = scorer_from_config(&config);
        let scores = scorer.score(&InvoiceMetadata::default(), &[]).await.unwrap();
        assert!(scores.is_empty());
    }
}
