//! REST client for the hosted realtime database.
//!
//! Paths follow the database's REST convention: `GET <base>/<path>.json`
//! reads a subtree (`null` when absent), `POST <base>/<path>.json` pushes a
//! child under a generated, insertion-ordered key and answers
//! `{"name": "<key>"}`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::error::ParleyError;
use crate::models::{ConversationRecord, StoredMessage};

use super::ConversationStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RestStore {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        match &self.auth_token {
            Some(token) => format!("{}/{}.json?auth={}", self.base_url, path, token),
            None => format!("{}/{}.json", self.base_url, path),
        }
    }
}

#[async_trait]
impl ConversationStore for RestStore {
    async fn create_conversation(
        &self,
        record: &ConversationRecord,
    ) -> Result<String, ParleyError> {
        let resp: PushResponse = self
            .client
            .post(self.url("conversations"))
            .json(record)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.name)
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: &StoredMessage,
    ) -> Result<String, ParleyError> {
        let path = format!("conversations/{}/messages", conversation_id);
        let resp: PushResponse = self
            .client
            .post(self.url(&path))
            .json(message)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.name)
    }

    async fn fetch_snapshot(&self) -> Result<BTreeMap<String, ConversationRecord>, ParleyError> {
        let snapshot: Option<BTreeMap<String, ConversationRecord>> = self
            .client
            .get(self.url("conversations"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(snapshot.unwrap_or_default())
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
    ) -> Result<BTreeMap<String, StoredMessage>, ParleyError> {
        let path = format!("conversations/{}/messages", conversation_id);
        let messages: Option<BTreeMap<String, StoredMessage>> = self
            .client
            .get(self.url(&path))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(messages.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sender;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> RestStore {
        RestStore::new(&StoreConfig {
            base_url: server.uri(),
            auth_token: None,
            poll_interval_seconds: 3,
        })
    }

    #[tokio::test]
    async fn create_conversation_returns_push_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "-NxAbCdEf"
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let key = store
            .create_conversation(&ConversationRecord::new_active())
            .await
            .unwrap();
        assert_eq!(key, "-NxAbCdEf");
    }

    #[tokio::test]
    async fn append_message_posts_wire_fields() {
        let server = MockServer::start().await;
        let message = StoredMessage {
            text: "Hello".to_string(),
            sender: Sender::Visitor,
            timestamp: 1700000000000,
        };
        Mock::given(method("POST"))
            .and(path("/conversations/conv-1/messages.json"))
            .and(body_json(serde_json::json!({
                "text": "Hello",
                "sender": "visitor",
                "timestamp": 1700000000000i64
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "-Nmsg1"
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let key = store.append_message("conv-1", &message).await.unwrap();
        assert_eq!(key, "-Nmsg1");
    }

    #[tokio::test]
    async fn empty_collection_reads_as_null() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::Value::Null))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let snapshot = store.fetch_snapshot().await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn auth_token_is_appended_to_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.json"))
            .and(wiremock::matchers::query_param("auth", "sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::Value::Null))
            .mount(&server)
            .await;

        let store = RestStore::new(&StoreConfig {
            base_url: server.uri(),
            auth_token: Some("sekrit".to_string()),
            poll_interval_seconds: 3,
        });
        assert!(store.fetch_snapshot().await.unwrap().is_empty());
    }
}
