//! Speech-recognition capability
//!
//! The default audio handler feeds buffered utterance audio here once the
//! VAD reports end of speech. The HTTP engine posts an in-memory WAV to a
//! transcription endpoint.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

use crate::config::ModuleConfig;

/// Speech-recognition capability over 16 kHz mono PCM
#[async_trait]
pub trait Asr: Send + Sync {
    async fn transcribe(&self, pcm: &[i16]) -> Result<String>;
}

/// Shared handle to a swappable ASR engine
pub type AsrHandle = Arc<dyn Asr>;

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// HTTP transcription engine (whisper-server style `/v1/audio/transcriptions`)
pub struct HttpAsr {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAsr {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_module_config(name: &str, cfg: &ModuleConfig) -> Result<Self> {
        let base_url = cfg
            .str_option("url")
            .with_context(|| format!("ASR module '{name}' is missing 'url'"))?;
        Ok(Self::new(base_url))
    }
}

#[async_trait]
impl Asr for HttpAsr {
    async fn transcribe(&self, pcm: &[i16]) -> Result<String> {
        if pcm.is_empty() {
            return Ok(String::new());
        }
        debug!(
            "Transcribing {} samples ({:.1}s of audio)",
            pcm.len(),
            pcm.len() as f64 / 16000.0
        );
        let wav_bytes = pcm_to_wav(pcm, 16000)?;
        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .header("Content-Type", "audio/wav")
            .body(wav_bytes)
            .send()
            .await
            .context("Failed to connect to ASR server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("ASR error ({status}): {body}");
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .context("Failed to parse ASR response")?;
        Ok(parsed.text.trim().to_string())
    }
}

/// Encode PCM i16 mono samples as WAV bytes in memory
pub fn pcm_to_wav(pcm: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
        for sample in pcm {
            writer.write_sample(*sample)?;
        }
        writer.finalize().context("Failed to finalize WAV")?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_to_wav_header() {
        let wav = pcm_to_wav(&[0, 1, -1, 100], 16000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte header plus 2 bytes per sample
        assert_eq!(wav.len(), 44 + 8);
    }

    #[tokio::test]
    async fn test_empty_pcm_transcribes_to_empty() {
        let asr = HttpAsr::new("http://localhost:1");
        assert_eq!(asr.transcribe(&[]).await.unwrap(), "");
    }
}
