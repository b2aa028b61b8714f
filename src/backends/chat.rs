use super::{ChatBackend, TextStream};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, future};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io;
use tokio_util::{
    codec::{FramedRead, LinesCodec},
    io::StreamReader,
};

const DONE_MARKER: &str = "[DONE]";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// OpenAI-compatible chat completions endpoint, consumed as server-sent
/// events.
#[derive(Clone)]
pub struct HttpChatBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpChatBackend {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Pull the text fragment out of one SSE line. `None` for keep-alives,
/// comments, role-only deltas and the terminal marker.
fn parse_event(line: &str) -> Result<Option<String>> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == DONE_MARKER {
        return Ok(None);
    }
    let chunk: ChatChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .reduce(|mut acc, part| {
            acc.push_str(&part);
            acc
        })
        .filter(|text| !text.is_empty()))
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream("chat", format!("HTTP {} - {}", status, body)));
        }

        let body = response.bytes_stream().map_err(io::Error::other);
        let lines = FramedRead::new(StreamReader::new(body), LinesCodec::new());
        let fragments = lines
            .take_while(|line| {
                let done = matches!(line, Ok(l) if l.trim_start_matches("data:").trim() == DONE_MARKER);
                future::ready(!done)
            })
            .map(|line| {
                let line = line.map_err(|err| Error::upstream("chat", err))?;
                parse_event(&line)
            })
            .try_filter_map(|fragment| future::ready(Ok(fragment)));

        Ok(fragments.boxed())
    }
}
