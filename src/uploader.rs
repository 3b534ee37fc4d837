//! Record-mode HTTP upload: one POST per finished utterance.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;

use crate::config::Config;
use crate::protocol::{UploadRequest, UploadResponse};

/// Post a complete WAV utterance and wait for the transcript/response.
///
/// Network and server failures surface as errors to the session loop; they
/// never take the client down.
pub async fn upload_utterance(config: &Config, wav: &[u8]) -> Result<UploadResponse> {
    let client = Client::new();

    let body = UploadRequest {
        client_id: config.client_id.clone(),
        format: "wav".to_string(),
        audio_base64: BASE64.encode(wav),
    };

    log::info!("Uploading utterance: {} WAV bytes to {}", wav.len(), config.http_url);

    let response = client
        .post(config.http_url)
        .header("Device-Id", &config.device_id)
        .header("Authorization", format!("Bearer {}", config.token))
        .json(&body)
        .send()
        .await
        .context("Upload request failed")?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("Upload rejected: {} {}", status, text);
    }

    response
        .json::<UploadResponse>()
        .await
        .context("Failed to parse upload response")
}
