//! Text generation providers
//!
//! Two implementations of [`TextGenerator`]:
//!
//! - [`LocalServerGenerator`] posts to a locally running model server
//!   (`POST {base}/generate`).
//! - [`RemoteGenerator`] calls a hosted `generateContent` API with an
//!   API key.
//!
//! Both build the same prompt and apply the same per-call timeout. Neither
//! retries; a failed generation surfaces as [`Error::Generation`] and the
//! pipeline substitutes the deterministic fallback text.

use std::time::Duration;

use airwave_common::config::ProviderConfig;
use airwave_common::error::{Error, Result};
use airwave_common::types::TrackRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationContext, TextGenerator};

/// Persona handed to the model alongside each prompt.
const SYSTEM_PROMPT: &str = "You are a radio DJ doing a live track transition. \
Write one short spoken line, at most two sentences, introducing the next track. \
Mention the next track's title and artist naturally. No emoji, no hashtags, \
no sound-effect annotations, nothing in brackets. Output only the line itself.";

fn build_prompt(prev: &TrackRef, next: &TrackRef, ctx: &GenerationContext) -> String {
    let mut prompt = format!(
        "The track just finishing is \"{}\" by {}. The next track is \"{}\" by {}.",
        prev.title, prev.artist, next.title, next.artist
    );
    if let Some(album) = &next.album {
        prompt.push_str(&format!(" The next track is from the album \"{album}\"."));
    }
    if let Some(time) = &ctx.time_of_day {
        prompt.push_str(&format!(" The local time is {time}."));
    }
    prompt
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Http(format!("building HTTP client: {e}")))
}

fn send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("text generation request: {e}"))
    } else {
        Error::Generation(format!("request failed: {e}"))
    }
}

fn validate(text: String) -> Result<String> {
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(Error::Generation("provider returned empty text".into()));
    }
    Ok(text)
}

/// Generator backed by a locally running model server.
pub struct LocalServerGenerator {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct LocalGenerateRequest<'a> {
    text: &'a str,
    system_prompt: &'a str,
}

#[derive(Deserialize)]
struct LocalGenerateResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl LocalServerGenerator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Self::new(config.local_server_url.clone(), config.provider_timeout())
    }
}

#[async_trait]
impl TextGenerator for LocalServerGenerator {
    fn provider_id(&self) -> &str {
        "local"
    }

    async fn generate(
        &self,
        prev: &TrackRef,
        next: &TrackRef,
        ctx: &GenerationContext,
    ) -> Result<String> {
        let prompt = build_prompt(prev, next, ctx);
        let url = format!("{}/generate", self.base_url.trim_end_matches('/'));
        debug!(%url, "requesting local text generation");

        let response = self
            .client
            .post(&url)
            .json(&LocalGenerateRequest {
                text: &prompt,
                system_prompt: SYSTEM_PROMPT,
            })
            .send()
            .await
            .map_err(send_error)?;

        if !response.status().is_success() {
            return Err(Error::Generation(format!(
                "local server returned {}",
                response.status()
            )));
        }

        let body: LocalGenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("malformed response: {e}")))?;
        if let Some(error) = body.error {
            return Err(Error::Generation(error));
        }
        match body.text {
            Some(text) => validate(text),
            None => Err(Error::Generation("response contained no text".into())),
        }
    }
}

/// Generator backed by a hosted `generateContent` API.
pub struct RemoteGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct RemotePart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct RemoteContent<'a> {
    parts: Vec<RemotePart<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoteGenerateRequest<'a> {
    contents: Vec<RemoteContent<'a>>,
    system_instruction: RemoteContent<'a>,
}

#[derive(Deserialize)]
struct RemoteGenerateResponse {
    candidates: Vec<RemoteCandidate>,
}

#[derive(Deserialize)]
struct RemoteCandidate {
    content: RemoteCandidateContent,
}

#[derive(Deserialize)]
struct RemoteCandidateContent {
    parts: Vec<RemoteResponsePart>,
}

#[derive(Deserialize)]
struct RemoteResponsePart {
    text: String,
}

impl RemoteGenerator {
    const DEFAULT_MODEL: &'static str = "gemini-2.0-flash";

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: Self::DEFAULT_MODEL.to_string(),
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let key = config
            .remote_api_key
            .clone()
            .ok_or_else(|| Error::Config("remote text provider selected but no API key set".into()))?;
        Self::new(config.remote_api_url.clone(), key, config.provider_timeout())
    }
}

#[async_trait]
impl TextGenerator for RemoteGenerator {
    fn provider_id(&self) -> &str {
        "remote"
    }

    async fn generate(
        &self,
        prev: &TrackRef,
        next: &TrackRef,
        ctx: &GenerationContext,
    ) -> Result<String> {
        let prompt = build_prompt(prev, next, ctx);
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        debug!(model = %self.model, "requesting remote text generation");

        let request = RemoteGenerateRequest {
            contents: vec![RemoteContent {
                parts: vec![RemotePart { text: &prompt }],
            }],
            system_instruction: RemoteContent {
                parts: vec![RemotePart {
                    text: SYSTEM_PROMPT,
                }],
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(send_error)?;

        if !response.status().is_success() {
            return Err(Error::Generation(format!(
                "remote API returned {}",
                response.status()
            )));
        }

        let body: RemoteGenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("malformed response: {e}")))?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| Error::Generation("response contained no candidates".into()))?;
        validate(text)
    }
}
