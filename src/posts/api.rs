//! Typed client for the board/post endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::error::{SubmitError, TransportError};
use super::schema::{BoardResponse, EditPostRequest, PostRequest, PostResponse};

#[async_trait]
pub trait PostApi: Send + Sync {
    async fn get_board(&self, board_id: i64) -> Result<BoardResponse, SubmitError>;

    async fn get_post(&self, board_id: i64, post_id: i64) -> Result<PostResponse, SubmitError>;

    async fn create_post(
        &self,
        board_id: i64,
        request: &PostRequest,
    ) -> Result<PostResponse, SubmitError>;

    async fn edit_post(
        &self,
        board_id: i64,
        post_id: i64,
        request: &EditPostRequest,
    ) -> Result<PostResponse, SubmitError>;
}

#[derive(Debug, Clone)]
pub struct HttpPostApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPostApi {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn with_timeout(
        base_url: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self::new(client, base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, SubmitError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!("API {} {}", method, url);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SubmitError::Unreachable(TransportError::from(e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SubmitError::Unreachable(TransportError::from(e)))?;
        if !status.is_success() {
            return Err(rejected(status.as_u16(), &text));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Build a `Rejected` error from a non-2xx response, reading `errorCode` and
/// `message` from the body when it is JSON. Either may be a string or a number.
pub fn rejected(status: u16, body: &str) -> SubmitError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let field = |name: &str| -> Option<String> {
        match parsed.as_ref()?.get(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };
    SubmitError::Rejected {
        status,
        error_code: field("errorCode"),
        message: field("message"),
    }
}

#[async_trait]
impl PostApi for HttpPostApi {
    async fn get_board(&self, board_id: i64) -> Result<BoardResponse, SubmitError> {
        self.call::<(), _>(Method::GET, &format!("/api/board/{board_id}"), None)
            .await
    }

    async fn get_post(&self, board_id: i64, post_id: i64) -> Result<PostResponse, SubmitError> {
        self.call::<(), _>(
            Method::GET,
            &format!("/api/board/{board_id}/post/{post_id}"),
            None,
        )
        .await
    }

    async fn create_post(
        &self,
        board_id: i64,
        request: &PostRequest,
    ) -> Result<PostResponse, SubmitError> {
        self.call(Method::POST, &format!("/api/board/{board_id}/post"), Some(request))
            .await
    }

    async fn edit_post(
        &self,
        board_id: i64,
        post_id: i64,
        request: &EditPostRequest,
    ) -> Result<PostResponse, SubmitError> {
        self.call(
            Method::PUT,
            &format!("/api/board/{board_id}/post/{post_id}"),
            Some(request),
        )
        .await
    }
}
