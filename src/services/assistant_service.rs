//! Vision counting and inventory Q&A backed by the Anthropic messages API.
//!
//! Assistant failures are reported to the caller and never touch stock.

use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::constants::{
    ANTHROPIC_API_URL, ANTHROPIC_VERSION, ASSISTANT_TIMEOUT_SECS, CHAT_MAX_TOKENS,
    VISION_MAX_TOKENS,
};
use crate::models::{
    new_id, Actor, AiCountLog, ChatMessage, ChatRole, ConversationTurn, CountEstimate, Item,
    NewAiCountLog,
};
use crate::store::{InventoryStore, StoreError};

const COUNT_PROMPT: &str = r#"You are analyzing an image of extrusion bundle ends for inventory counting.

Count the number of distinct extrusion/profile ends visible in this image. These are typically circular, square, or rectangular cross-sections of aluminum extrusions bundled together.

Instructions:
1. Look for the distinct end profiles of each extrusion
2. Count each separate extrusion end you can see
3. If ends are partially obscured, make your best estimate
4. Focus only on the extrusion ends, ignore any background elements

Respond with ONLY a JSON object in this exact format:
{"count": <number>, "confidence": "high" | "medium" | "low", "notes": "<brief observation>"}

Do not include any other text before or after the JSON."#;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("AI assistant is not configured. Set ANTHROPIC_API_KEY to enable it.")]
    NotConfigured,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("AI service request failed: {0}")]
    Upstream(String),

    #[error("Could not parse AI response")]
    UnparseableReply,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default)]
pub struct AssistantConfig {
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Clone)]
pub struct AssistantService {
    client: reqwest::Client,
    config: AssistantConfig,
    store: Arc<dyn InventoryStore>,
}

impl AssistantService {
    pub fn new(config: AssistantConfig, store: Arc<dyn InventoryStore>) -> Result<Self, AssistantError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(ASSISTANT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AssistantError::Upstream(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            store,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Estimate how many pieces are visible in a photo given as a data URL.
    /// Without an API key a demo estimate is returned.
    #[instrument(skip(self, image_data_url))]
    pub async fn estimate_count(&self, image_data_url: &str) -> Result<CountEstimate, AssistantError> {
        if image_data_url.trim().is_empty() {
            return Err(AssistantError::InvalidRequest("No image provided".to_string()));
        }

        let Some(api_key) = self.config.api_key.as_deref() else {
            info!("🤖 No ANTHROPIC_API_KEY configured, returning demo count");
            return Ok(demo_estimate());
        };

        let (media_type, data) = split_data_url(image_data_url);
        let body = json!({
            "model": self.config.model,
            "max_tokens": VISION_MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": { "type": "base64", "media_type": media_type, "data": data }
                    },
                    { "type": "text", "text": COUNT_PROMPT }
                ]
            }]
        });

        let text = self.send(api_key, &body).await?;
        parse_count_reply(&text)
    }

    /// Answer a free-form question about the current catalog
    #[instrument(skip(self, history, items), fields(items = items.len()))]
    pub async fn answer(
        &self,
        question: &str,
        history: &[ConversationTurn],
        items: &[Item],
    ) -> Result<String, AssistantError> {
        if question.trim().is_empty() {
            return Err(AssistantError::InvalidRequest("No question provided".to_string()));
        }
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(AssistantError::NotConfigured)?;

        let summary = serde_json::to_string_pretty(&inventory_summary(items))
            .map_err(|e| AssistantError::InvalidRequest(e.to_string()))?;
        let prompt = format!(
            "You are an inventory management assistant for a construction materials warehouse. \
             You have access to the current inventory data and can answer questions about it.\n\n\
             Current inventory data ({} items):\n{}\n\nUser question: {}\n\n\
             Please provide a helpful, concise answer based on the inventory data. If you're analyzing \
             quantities, totals, or trends, be specific with numbers. If the question requires \
             calculations, show your work.",
            items.len(),
            summary,
            question
        );

        let mut messages: Vec<Value> = history
            .iter()
            .map(|turn| json!({ "role": turn.role.as_str(), "content": turn.content }))
            .collect();
        messages.push(json!({ "role": "user", "content": prompt }));

        let body = json!({
            "model": self.config.model,
            "max_tokens": CHAT_MAX_TOKENS,
            "messages": messages,
        });
        self.send(api_key, &body).await
    }

    /// Ask a question as `actor`, keeping the exchange in the user's chat history
    pub async fn chat(
        &self,
        question: &str,
        history: &[ConversationTurn],
        actor: &Actor,
    ) -> Result<String, AssistantError> {
        let items = self.store.list_items().await?;
        let reply = self.answer(question, history, &items).await?;

        for (role, content) in [(ChatRole::User, question), (ChatRole::Assistant, reply.as_str())] {
            let message = ChatMessage {
                id: new_id(),
                user_id: actor.user_id.clone(),
                user_name: actor.user_name.clone(),
                role,
                content: content.to_string(),
                created_at: Utc::now(),
            };
            match self.store.insert_chat_message(&message).await {
                Ok(()) | Err(StoreError::NotConfigured) => {}
                Err(e) => warn!("⚠️ Failed to save chat message: {}", e),
            }
        }
        Ok(reply)
    }

    pub async fn chat_history(&self, user_id: Option<&str>) -> Result<Vec<ChatMessage>, AssistantError> {
        Ok(self.store.chat_messages(user_id).await?)
    }

    pub async fn clear_history(&self, user_id: &str) -> Result<usize, AssistantError> {
        Ok(self.store.clear_chat_messages(user_id).await?)
    }

    /// Keep the AI estimate next to the count the user confirmed
    pub async fn record_count_log(
        &self,
        log: NewAiCountLog,
        actor: &Actor,
    ) -> Result<AiCountLog, AssistantError> {
        if log.ai_count < 0 || log.confirmed_count < 0 {
            return Err(AssistantError::InvalidRequest(
                "Counts cannot be negative".to_string(),
            ));
        }
        let entry = AiCountLog {
            id: new_id(),
            item_id: log.item_id,
            image_url: log.image_url,
            ai_count: log.ai_count,
            confirmed_count: log.confirmed_count,
            user_id: actor.user_id.clone(),
            user_name: actor.user_name.clone(),
            profile_name: log.profile_name,
            created_at: Utc::now(),
        };
        self.store.insert_ai_log(&entry).await?;
        Ok(entry)
    }

    pub async fn count_logs(&self, limit: usize) -> Result<Vec<AiCountLog>, AssistantError> {
        Ok(self.store.list_ai_logs(limit).await?)
    }

    async fn send(&self, api_key: &str, body: &Value) -> Result<String, AssistantError> {
        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| AssistantError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("🚨 AI API error {}: {}", status, error_text);
            return Err(AssistantError::Upstream(format!("AI service returned {status}")));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Upstream(format!("Failed to parse AI response: {e}")))?;

        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| AssistantError::Upstream("No response from AI".to_string()))
    }
}

fn demo_estimate() -> CountEstimate {
    CountEstimate {
        count: rand::thread_rng().gen_range(5..=24),
        confidence: "demo".to_string(),
        notes: Some("Demo mode - add ANTHROPIC_API_KEY for real AI counting".to_string()),
    }
}

/// `(media_type, base64 payload)` of a `data:image/...;base64,` URL.
/// Bare payloads are assumed to be JPEG.
pub fn split_data_url(url: &str) -> (String, &str) {
    if let Some(rest) = url.strip_prefix("data:") {
        if let Some((media_type, data)) = rest.split_once(";base64,") {
            if media_type.starts_with("image/") {
                return (media_type.to_string(), data);
            }
        }
    }
    ("image/jpeg".to_string(), url)
}

/// Read the model's count reply. A non-JSON reply falls back to the first
/// integer in the text with low confidence.
pub fn parse_count_reply(text: &str) -> Result<CountEstimate, AssistantError> {
    let trimmed = text.trim();
    if let Ok(estimate) = serde_json::from_str::<CountEstimate>(trimmed) {
        return Ok(estimate);
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(estimate) = serde_json::from_str::<CountEstimate>(&trimmed[start..=end]) {
                return Ok(estimate);
            }
        }
    }

    let digits: String = trimmed
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let count = digits
        .parse::<i32>()
        .map_err(|_| AssistantError::UnparseableReply)?;

    Ok(CountEstimate {
        count,
        confidence: "low".to_string(),
        notes: Some("Extracted from non-JSON response".to_string()),
    })
}

/// Compact per-item view sent along with chat questions
pub fn inventory_summary(items: &[Item]) -> Value {
    let rows: Vec<Value> = items
        .iter()
        .map(|item| {
            json!({
                "name": item.name,
                "category": item.category.as_str(),
                "quantity": item.quantity,
                "location": non_empty_or(&item.location, "N/A"),
                "supplier": non_empty_or(&item.supplier, "N/A"),
                "sku": item.sku.as_deref().unwrap_or("N/A"),
                "reorderLevel": item.reorder_level,
                "unitCost": item
                    .unit_cost
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "N/A".to_string()),
                "notes": item.notes,
            })
        })
        .collect();
    Value::Array(rows)
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, NewItem, Role};
    use crate::store::LocalStore;

    fn service(api_key: Option<&str>) -> AssistantService {
        AssistantService::new(
            AssistantConfig {
                api_key: api_key.map(str::to_string),
                model: "test-model".to_string(),
            },
            Arc::new(LocalStore::in_memory()),
        )
        .unwrap()
    }

    fn actor() -> Actor {
        Actor {
            user_id: "u-9".to_string(),
            user_name: "Sam".to_string(),
            role: Role::User,
        }
    }

    #[test]
    fn test_split_data_url() {
        let (media, data) = split_data_url("data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(media, "image/png");
        assert_eq!(data, "iVBORw0KGgo=");
        let (media, data) = split_data_url("iVBORw0KGgo=");
        assert_eq!(media, "image/jpeg");
        assert_eq!(data, "iVBORw0KGgo=");
    }

    #[test]
    fn test_parse_json_reply() {
        let estimate =
            parse_count_reply(r#"{"count": 37, "confidence": "high", "notes": "tight bundle"}"#).unwrap();
        assert_eq!(estimate.count, 37);
        assert_eq!(estimate.confidence, "high");

        let fenced = parse_count_reply("```json\n{\"count\": 8, \"confidence\": \"medium\"}\n```").unwrap();
        assert_eq!(fenced.count, 8);
        assert_eq!(fenced.notes, None);
    }

    #[test]
    fn test_parse_free_text_reply() {
        let estimate = parse_count_reply("I can see about 42 extrusion ends.").unwrap();
        assert_eq!(estimate.count, 42);
        assert_eq!(estimate.confidence, "low");
        assert!(matches!(
            parse_count_reply("no idea"),
            Err(AssistantError::UnparseableReply)
        ));
    }

    #[test]
    fn test_summary_fills_placeholders() {
        let item = NewItem {
            name: "Drill bits".to_string(),
            category: Category::Tools,
            quantity: 3,
            ..Default::default()
        }
        .into_item(Utc::now());
        let summary = inventory_summary(&[item]);
        assert_eq!(summary[0]["location"], "N/A");
        assert_eq!(summary[0]["unitCost"], "N/A");
        assert_eq!(summary[0]["category"], "Tools");
    }

    #[tokio::test]
    async fn test_demo_estimate_without_key() {
        let estimate = service(None).estimate_count("data:image/jpeg;base64,AAAA").await.unwrap();
        assert_eq!(estimate.confidence, "demo");
        assert!((5..=24).contains(&estimate.count));
    }

    #[tokio::test]
    async fn test_chat_requires_key() {
        let err = service(None).chat("How many panels?", &[], &actor()).await.unwrap_err();
        assert!(matches!(err, AssistantError::NotConfigured));
        assert!(matches!(
            service(Some("k")).answer("  ", &[], &[]).await,
            Err(AssistantError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_count_logs_are_kept() {
        let assistant = service(None);
        let log = assistant
            .record_count_log(
                NewAiCountLog {
                    item_id: None,
                    image_url: "data:image/jpeg;base64,AAAA".to_string(),
                    ai_count: 19,
                    confirmed_count: 20,
                    profile_name: Some("1x1 tube".to_string()),
                },
                &actor(),
            )
            .await
            .unwrap();
        assert_eq!(log.user_name, "Sam");
        let logs = assistant.count_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].confirmed_count, 20);
    }
}
