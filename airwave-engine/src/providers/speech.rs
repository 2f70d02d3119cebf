//! Speech synthesis providers
//!
//! [`LocalServerSynthesizer`] posts announcement text to the local model
//! server (`POST {base}/speak`) and receives encoded audio bytes back.
//! [`RemoteSynthesizer`] does the same against a hosted endpoint.

use std::time::Duration;

use airwave_common::config::ProviderConfig;
use airwave_common::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{AudioHandle, SpeechSynthesizer};

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Http(format!("building HTTP client: {e}")))
}

fn send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("synthesis request: {e}"))
    } else {
        Error::Synthesis(format!("request failed: {e}"))
    }
}

async fn fetch_audio(
    client: &reqwest::Client,
    url: &str,
    text: &str,
    provider: &str,
) -> Result<AudioHandle> {
    debug!(%url, chars = text.len(), "requesting speech synthesis");

    let response = client
        .post(url)
        .json(&SpeakRequest { text })
        .send()
        .await
        .map_err(send_error)?;

    if !response.status().is_success() {
        return Err(Error::Synthesis(format!(
            "synthesizer returned {}",
            response.status()
        )));
    }

    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("audio/wav")
        .to_string();

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::Synthesis(format!("reading audio body: {e}")))?;
    if bytes.is_empty() {
        return Err(Error::Synthesis("synthesizer returned empty audio".into()));
    }

    Ok(AudioHandle::new(bytes.to_vec(), mime, provider))
}

/// Synthesizer backed by the local model server.
pub struct LocalServerSynthesizer {
    client: reqwest::Client,
    base_url: String,
}

impl LocalServerSynthesizer {
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
impl SpeechSynthesizer for LocalServerSynthesizer {
    fn provider_id(&self) -> &str {
        "local"
    }

    async fn synthesize(&self, text: &str) -> Result<AudioHandle> {
        let url = format!("{}/speak", self.base_url.trim_end_matches('/'));
        fetch_audio(&self.client, &url, text, self.provider_id()).await
    }
}

/// Synthesizer backed by a hosted endpoint with an API key.
pub struct RemoteSynthesizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RemoteSynthesizer {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let key = config.remote_api_key.clone().ok_or_else(|| {
            Error::Config("remote speech provider selected but no API key set".into())
        })?;
        Self::new(config.remote_api_url.clone(), key, config.provider_timeout())
    }
}

#[async_trait]
impl SpeechSynthesizer for RemoteSynthesizer {
    fn provider_id(&self) -> &str {
        "remote"
    }

    async fn synthesize(&self, text: &str) -> Result<AudioHandle> {
        let url = format!("{}/speak", self.base_url.trim_end_matches('/'));
        debug!("requesting remote speech synthesis");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&SpeakRequest { text })
            .send()
            .await
            .map_err(send_error)?;

        if !response.status().is_success() {
            return Err(Error::Synthesis(format!(
                "remote synthesizer returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(format!("reading audio body: {e}")))?;
        if bytes.is_empty() {
            return Err(Error::Synthesis("synthesizer returned empty audio".into()));
        }

        Ok(AudioHandle::new(bytes.to_vec(), "audio/mpeg", self.provider_id()))
    }
}
