//! Headline favorability classification.
//!
//! Two strategies behind the [`NewsClassifier`] capability trait: an
//! LLM-backed classifier and a deterministic keyword fallback. The strategy
//! is selected once at construction ([`classifier_from_env`]); call sites
//! never branch on availability.

use async_trait::async_trait;
use screener_core::{NewsClassification, NewsClassifier, NewsItem, ScreenerError};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Headlines considered per classification
const MAX_HEADLINES: usize = 5;
const MAX_REASON_CHARS: usize = 100;

const FALLBACK_POSITIVE: &[&str] = &[
    "흑자", "수주", "계약", "승인", "성공", "최대", "증가", "개선", "호실적", "상향", "돌파",
    "신고가",
];

const FALLBACK_NEGATIVE: &[&str] = &[
    "적자", "하락", "감소", "악화", "폐지", "매도", "횡령", "분식", "수사", "기소",
];

/// Deterministic keyword-based classifier. Same inputs, same verdict.
#[derive(Debug, Default, Clone)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn classify_sync(&self, news: &[NewsItem]) -> NewsClassification {
        let mut score: i32 = 0;
        let mut matched: Vec<&str> = Vec::new();

        for item in news.iter().take(MAX_HEADLINES) {
            if let Some(kw) = FALLBACK_POSITIVE
                .iter()
                .find(|kw| item.title.contains(*kw))
            {
                score += 1;
                matched.push(kw);
            }
            if FALLBACK_NEGATIVE.iter().any(|kw| item.title.contains(kw)) {
                score -= 1;
            }
        }

        let reason = if matched.is_empty() {
            "키워드 분석".to_string()
        } else {
            matched
                .iter()
                .take(3)
                .copied()
                .collect::<Vec<_>>()
                .join(", ")
        };

        NewsClassification {
            score: score.clamp(0, 3) as u8,
            reason,
        }
    }
}

#[async_trait]
impl NewsClassifier for KeywordClassifier {
    async fn classify(
        &self,
        _stock_name: &str,
        news: &[NewsItem],
    ) -> Result<NewsClassification, ScreenerError> {
        if news.is_empty() {
            return Ok(NewsClassification {
                score: 0,
                reason: "뉴스 없음".to_string(),
            });
        }
        Ok(self.classify_sync(news))
    }
}

const SYSTEM_PROMPT: &str = "당신은 주식 뉴스 분석가입니다. \
종목 뉴스의 호재 점수를 0~3점으로 평가하세요. \
3점: 강력한 호재 (대규모 수주, 흑자전환, 신약 승인, M&A). \
2점: 긍정적 뉴스 (실적 개선, 신제품, 투자 유치). \
1점: 약한 호재 또는 중립. 0점: 호재 없음 또는 악재. \
반드시 {\"score\": 0-3, \"reason\": \"50자 이내\"} JSON으로만 응답하세요.";

/// LLM-backed classifier against an OpenAI-compatible chat endpoint.
/// Any request or parse failure degrades to the keyword fallback.
pub struct LlmClassifier {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    fallback: KeywordClassifier,
}

impl LlmClassifier {
    pub fn new(api_key: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            fallback: KeywordClassifier::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn request_verdict(
        &self,
        stock_name: &str,
        news: &[NewsItem],
    ) -> Result<NewsClassification, ScreenerError> {
        let headlines: Vec<String> = news
            .iter()
            .take(MAX_HEADLINES)
            .map(|n| format!("- [{}] {}", n.source, n.title))
            .collect();

        let prompt = format!(
            "종목: {}\n\n뉴스 목록:\n{}\n\n위 뉴스를 분석하여 호재 점수를 평가하세요.",
            stock_name,
            headlines.join("\n")
        );

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "temperature": 0.3,
            "max_tokens": 200,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ScreenerError::ClassifierError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ScreenerError::ClassifierError(format!(
                "HTTP {}",
                response.status()
            )));
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            content: String,
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ScreenerError::ClassifierError(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ScreenerError::ClassifierError("empty completion".to_string()))?;

        parse_verdict(content)
            .ok_or_else(|| ScreenerError::ClassifierError("unparseable verdict".to_string()))
    }
}

#[async_trait]
impl NewsClassifier for LlmClassifier {
    async fn classify(
        &self,
        stock_name: &str,
        news: &[NewsItem],
    ) -> Result<NewsClassification, ScreenerError> {
        if news.is_empty() {
            return Ok(NewsClassification {
                score: 0,
                reason: "뉴스 없음".to_string(),
            });
        }

        match self.request_verdict(stock_name, news).await {
            Ok(verdict) => Ok(verdict),
            Err(e) => {
                tracing::warn!("LLM classification failed, using keyword fallback: {}", e);
                self.fallback.classify(stock_name, news).await
            }
        }
    }
}

/// Extract the JSON object embedded in a completion and clamp its fields.
fn parse_verdict(content: &str) -> Option<NewsClassification> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }

    #[derive(Deserialize)]
    struct RawVerdict {
        score: i64,
        #[serde(default)]
        reason: String,
    }

    let raw: RawVerdict = serde_json::from_str(&content[start..=end]).ok()?;

    Some(NewsClassification {
        score: raw.score.clamp(0, 3) as u8,
        reason: raw.reason.chars().take(MAX_REASON_CHARS).collect(),
    })
}

/// Pick the classifier strategy once, from the environment: LLM when an API
/// key is configured, deterministic keywords otherwise.
pub fn classifier_from_env() -> Arc<dyn NewsClassifier> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(api_key) if !api_key.is_empty() => {
            let model =
                std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
            tracing::info!(model, "Using LLM news classifier");
            Arc::new(LlmClassifier::new(api_key, model))
        }
        _ => {
            tracing::info!("No LLM credentials, using keyword news classifier");
            Arc::new(KeywordClassifier::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str) -> NewsItem {
        NewsItem {
            title: title.to_string(),
            summary: String::new(),
            source: "연합뉴스".to_string(),
            url: String::new(),
            credibility: 0.9,
            published_at: None,
        }
    }

    #[tokio::test]
    async fn keyword_classifier_scores_and_explains() {
        let classifier = KeywordClassifier::new();
        let news = vec![
            item("대규모 수주 공시"),
            item("흑자전환 기대감"),
            item("경쟁사 주가 하락"),
        ];

        let verdict = classifier.classify("테스트", &news).await.unwrap();
        // +1 (수주) +1 (흑자) -1 (하락) = 1
        assert_eq!(verdict.score, 1);
        assert!(verdict.reason.contains("수주"));
    }

    #[tokio::test]
    async fn keyword_classifier_is_deterministic_and_clamped() {
        let classifier = KeywordClassifier::new();
        let news: Vec<NewsItem> = (0..5).map(|_| item("수주 성공 돌파")).collect();

        let first = classifier.classify("테스트", &news).await.unwrap();
        let second = classifier.classify("테스트", &news).await.unwrap();
        assert_eq!(first.score, second.score);
        assert_eq!(first.reason, second.reason);
        assert_eq!(first.score, 3); // 5 matches clamped to 3
    }

    #[tokio::test]
    async fn empty_news_scores_zero() {
        let classifier = KeywordClassifier::new();
        let verdict = classifier.classify("테스트", &[]).await.unwrap();
        assert_eq!(verdict.score, 0);
    }

    #[test]
    fn parse_verdict_extracts_embedded_json() {
        let content = "Here you go:\n{\"score\": 2, \"reason\": \"실적 개선\"}\nthanks";
        let verdict = parse_verdict(content).unwrap();
        assert_eq!(verdict.score, 2);
        assert_eq!(verdict.reason, "실적 개선");
    }

    #[test]
    fn parse_verdict_clamps_out_of_range_scores() {
        let verdict = parse_verdict("{\"score\": 9, \"reason\": \"\"}").unwrap();
        assert_eq!(verdict.score, 3);

        let negative = parse_verdict("{\"score\": -2, \"reason\": \"\"}").unwrap();
        assert_eq!(negative.score, 0);
    }

    #[test]
    fn parse_verdict_rejects_garbage() {
        assert!(parse_verdict("no json here").is_none());
        assert!(parse_verdict("{not valid}").is_none());
    }
}
