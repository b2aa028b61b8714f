use super::Recognizer;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct RecognizeResponse {
    content: String,
}

/// Recognition service reached over HTTP: `POST {endpoint}` with
/// `{"url": ...}`, answered by `{"content": ...}`.
#[derive(Clone)]
pub struct HttpRecognizer {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpRecognizer {
    pub fn new(client: Client, endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            token,
        }
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn recognize(&self, image_url: &str) -> Result<String> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&RecognizeRequest { url: image_url });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(
                "recognizer",
                format!("HTTP {} - {}", status, body),
            ));
        }

        let body: RecognizeResponse = response.json().await?;
        Ok(body.content)
    }
}
