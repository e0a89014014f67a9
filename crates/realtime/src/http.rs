//! REST reader over the backend API with automatic retries.

use std::time::Duration;

use api_types::{
    ConversationFilters, ConversationWithRelations, DEFAULT_PAGE_SIZE, ListConversationsResponse,
    ListMessagesResponse, Message, PresenceStatus, UpdatePresenceStatusRequest, User,
};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::{
    RealtimeError,
    error::map_reqwest_error,
    gateway::ConversationReader,
};

#[derive(Clone)]
pub struct HttpReader {
    base: Url,
    http: Client,
    token: SecretString,
}

impl std::fmt::Debug for HttpReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReader")
            .field("base", &self.base)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl HttpReader {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base: Url, token: SecretString) -> Result<Self, RealtimeError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("inbox-realtime/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;
        Ok(Self { base, http, token })
    }

    pub async fn me(&self) -> Result<User, RealtimeError> {
        self.get("/users/me", &()).await
    }

    async fn send<Q, B>(
        &self,
        method: Method,
        path: &str,
        query: &Q,
        body: Option<&B>,
    ) -> Result<reqwest::Response, RealtimeError>
    where
        Q: Serialize + ?Sized,
        B: Serialize,
    {
        let url = self
            .base
            .join(path)
            .map_err(|e| RealtimeError::Url(e.to_string()))?;

        let operation = || async {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(self.token.expose_secret())
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await.map_err(map_reqwest_error)?;
            match response.status() {
                s if s.is_success() => Ok(response),
                StatusCode::UNAUTHORIZED => Err(RealtimeError::Auth),
                s => {
                    let status = s.as_u16();
                    let body = response.text().await.unwrap_or_default();
                    Err(RealtimeError::Http { status, body })
                }
            }
        };

        operation
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(500))
                    .with_max_delay(Duration::from_secs(2))
                    .with_max_times(2)
                    .with_jitter(),
            )
            .when(RealtimeError::should_retry)
            .notify(|e, dur| {
                warn!(
                    "API call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }

    async fn get<T, Q>(&self, path: &str, query: &Q) -> Result<T, RealtimeError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let response = self.send(Method::GET, path, query, None::<&()>).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RealtimeError::Serde(e.to_string()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationListQuery<'a> {
    business_id: Uuid,
    #[serde(flatten)]
    filters: &'a ConversationFilters,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessagePageQuery {
    conversation_id: Uuid,
    limit: i64,
    offset: i64,
}

/// A single-row read answered with 404 or 403 means the row is gone or no
/// longer visible to us, e.g. a conversation reassigned away from a limited
/// agent.
fn visible<T>(result: Result<T, RealtimeError>) -> Result<Option<T>, RealtimeError> {
    match result {
        Ok(row) => Ok(Some(row)),
        Err(RealtimeError::Http {
            status: 403 | 404, ..
        }) => Ok(None),
        Err(error) => Err(error),
    }
}

#[async_trait]
impl ConversationReader for HttpReader {
    async fn list_conversations(
        &self,
        business_id: Uuid,
        filters: &ConversationFilters,
    ) -> Result<Vec<ConversationWithRelations>, RealtimeError> {
        let query = ConversationListQuery {
            business_id,
            filters,
        };
        let response: ListConversationsResponse = self.get("/conversations", &query).await?;
        Ok(response.conversations)
    }

    async fn conversation(
        &self,
        id: Uuid,
    ) -> Result<Option<ConversationWithRelations>, RealtimeError> {
        visible(self.get(&format!("/conversations/{id}"), &()).await)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, RealtimeError> {
        let mut messages = Vec::new();
        loop {
            let query = MessagePageQuery {
                conversation_id,
                limit: DEFAULT_PAGE_SIZE,
                offset: i64::try_from(messages.len()).unwrap_or(i64::MAX),
            };
            let page: ListMessagesResponse = self.get("/messages", &query).await?;
            let fetched = page.messages.len();
            messages.extend(page.messages);
            if i64::try_from(fetched).unwrap_or(0) < DEFAULT_PAGE_SIZE {
                return Ok(messages);
            }
        }
    }

    async fn set_status(&self, status: PresenceStatus) -> Result<(), RealtimeError> {
        let body = UpdatePresenceStatusRequest { status };
        self.send(Method::PATCH, "/users/me/status", &(), Some(&body))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> RealtimeError {
        RealtimeError::Http {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn hidden_and_missing_rows_read_as_none() {
        assert!(matches!(visible::<()>(Err(http(403))), Ok(None)));
        assert!(matches!(visible::<()>(Err(http(404))), Ok(None)));
        assert!(matches!(visible(Ok(7)), Ok(Some(7))));
    }

    #[test]
    fn expired_sessions_and_server_errors_still_fail() {
        assert!(matches!(
            visible::<()>(Err(RealtimeError::Auth)),
            Err(RealtimeError::Auth)
        ));
        assert!(matches!(
            visible::<()>(Err(http(500))),
            Err(RealtimeError::Http { status: 500, .. })
        ));
    }
}
