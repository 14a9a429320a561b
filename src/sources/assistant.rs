//! Elastic Agent Builder conversational responder
//!
//! Proxies chat messages to the `/converse` endpoint. All credentials stay
//! server-side; the dashboard only ever talks to this service.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ConversationalResponder, SourceError};
use crate::config::AssistantConfig;

pub struct AgentBuilderResponder {
    http: reqwest::Client,
    converse_url: String,
    api_key: String,
    agent_id: String,
    timeout: Duration,
}

impl AgentBuilderResponder {
    pub fn from_config(config: &AssistantConfig) -> Result<Self, SourceError> {
        if !config.is_configured() {
            return Err(SourceError::NotConfigured("assistant.kb_url / assistant.api_key"));
        }
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            converse_url: format!(
                "{}/api/agent_builder/agents/{}/converse",
                config.kb_url.trim_end_matches('/'),
                config.agent_id
            ),
            api_key: config.api_key.clone(),
            agent_id: config.agent_id.clone(),
            timeout,
        })
    }
}

#[async_trait]
impl ConversationalResponder for AgentBuilderResponder {
    async fn reply(&self, context: &str, message: &str) -> Result<String, SourceError> {
        let body = json!({
            "agentId": self.agent_id,
            "message": format!("CONTEXT: {context}\nUSER MESSAGE: {message}"),
            "stream": false,
        });

        let resp = self
            .http
            .post(&self.converse_url)
            .header("Authorization", format!("ApiKey {}", self.api_key))
            .header("kbn-xsrf", "true")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout(self.timeout)
                } else {
                    SourceError::Http(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status(status));
        }
        let data: Value = resp.json().await?;
        extract_reply(&data)
    }
}

/// Pull the reply text out of the several shapes `/converse` answers with:
/// `text`, `result.content[0].text`, `message`, and finally the raw JSON.
pub fn extract_reply(data: &Value) -> Result<String, SourceError> {
    if !data.is_object() {
        return Err(SourceError::Malformed("converse response is not an object".to_string()));
    }
    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };

    Ok(non_empty(data.get("text"))
        .or_else(|| non_empty(data.pointer("/result/content/0/text")))
        .or_else(|| non_empty(data.get("message")))
        .unwrap_or_else(|| data.to_string()))
}
