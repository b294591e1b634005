//! reqwest-backed [`RemoteSessionRecorder`].

use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{CompleteSessionRequest, CompleteSessionResponse, RemoteSessionRecorder, TokenProvider};
use crate::error::RecorderError;
use crate::storage::RemoteConfig;

/// Records sessions via `POST {base_url}/sessions`.
pub struct HttpSessionRecorder {
    client: reqwest::Client,
    endpoint: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpSessionRecorder {
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(config: &RemoteConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, RecorderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: sessions_endpoint(&config.base_url)?,
            tokens,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// `base_url` joined with `sessions`, treating the base as a directory.
fn sessions_endpoint(base_url: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base_url)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("sessions")
}

impl RemoteSessionRecorder for HttpSessionRecorder {
    async fn complete_session(
        &self,
        request: &CompleteSessionRequest,
    ) -> Result<CompleteSessionResponse, RecorderError> {
        let token = self.tokens.token().ok_or(RecorderError::Unauthenticated)?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .header("Idempotency-Key", &request.idempotency_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RecorderError::Server {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| RecorderError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::StaticToken;

    fn recorder(base_url: &str, token: &str) -> HttpSessionRecorder {
        let config = RemoteConfig {
            base_url: base_url.to_string(),
            timeout_secs: 5,
        };
        HttpSessionRecorder::new(&config, Arc::new(StaticToken(token.into()))).unwrap()
    }

    fn request() -> CompleteSessionRequest {
        CompleteSessionRequest {
            duration_minutes: 25,
            task_id: Some(3),
            idempotency_key: "key-1".into(),
        }
    }

    #[test]
    fn endpoint_joins_under_base_path() {
        assert_eq!(
            sessions_endpoint("https://api.example.com/api").unwrap().as_str(),
            "https://api.example.com/api/sessions"
        );
        assert_eq!(
            sessions_endpoint("https://api.example.com/api/").unwrap().as_str(),
            "https://api.example.com/api/sessions"
        );
        assert_eq!(
            sessions_endpoint("http://127.0.0.1:1234").unwrap().as_str(),
            "http://127.0.0.1:1234/sessions"
        );
        assert!(sessions_endpoint("not a url").is_err());
    }

    #[tokio::test]
    async fn posts_session_and_parses_coins() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sessions")
            .match_header("authorization", "Bearer secret")
            .match_header("idempotency-key", "key-1")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({"duration_minutes": 25, "task_id": 3}),
            ))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"coins_earned": 30, "total_coins": 90}"#)
            .create_async()
            .await;

        let resp = recorder(&server.url(), "secret")
            .complete_session(&request())
            .await
            .unwrap();
        assert_eq!(resp.coins_earned, 30);
        assert_eq!(resp.extra["total_coins"], 90);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/sessions")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = recorder(&server.url(), "secret")
            .complete_session(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::Server { status: 500, ref body } if body == "boom"));
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/sessions")
            .with_status(200)
            .with_body("{\"coins\": 1}")
            .create_async()
            .await;

        let err = recorder(&server.url(), "secret")
            .complete_session(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::Decode(_)));
    }

    #[tokio::test]
    async fn missing_token_short_circuits() {
        let err = recorder("http://127.0.0.1:9", "")
            .complete_session(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::Unauthenticated));
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let err = recorder("http://127.0.0.1:9", "secret")
            .complete_session(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::Network(_)));
    }
}
