//! Text-to-speech capability
//!
//! Synthesis produces an on-disk WAV artifact which is then converted into
//! the ordered frame list streamed to the client. The HTTP engine targets
//! any OpenAI-compatible `/v1/audio/speech` endpoint.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::config::ModuleConfig;

/// Frame duration used when slicing decoded audio for transmission
const FRAME_MS: u32 = 60;

/// Text-to-speech capability
#[async_trait]
pub trait Tts: Send + Sync {
    /// Synthesize one segment to an audio artifact; `None` on engine failure
    async fn to_tts(&self, text: &str) -> Result<Option<PathBuf>>;

    /// Convert an artifact into ordered encoded frames plus its duration in
    /// seconds
    fn audio_to_opus_data(&self, path: &Path) -> Result<(Vec<Vec<u8>>, f64)>;

    /// Whether artifacts should be removed after playback
    fn delete_audio_file(&self) -> bool;
}

/// Shared handle to a swappable TTS engine
pub type TtsHandle = Arc<dyn Tts>;

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// HTTP synthesis engine (Kokoro-style `/v1/audio/speech`)
pub struct HttpTts {
    client: reqwest::Client,
    base_url: String,
    voice: String,
    model: String,
    output_dir: PathBuf,
    delete_audio: bool,
}

impl HttpTts {
    pub fn new(base_url: &str, voice: &str, model: &str, delete_audio: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            voice: voice.to_string(),
            model: model.to_string(),
            output_dir: std::env::temp_dir(),
            delete_audio,
        }
    }

    /// Build from a named module block (`url`, `voice`, `model`)
    pub fn from_module_config(name: &str, cfg: &ModuleConfig, delete_audio: bool) -> Result<Self> {
        let base_url = cfg
            .str_option("url")
            .with_context(|| format!("TTS module '{name}' is missing 'url'"))?;
        let voice = cfg.str_option("voice").unwrap_or("default");
        let model = cfg.str_option("model").unwrap_or("tts-1");
        Ok(Self::new(base_url, voice, model, delete_audio))
    }
}

#[async_trait]
impl Tts for HttpTts {
    async fn to_tts(&self, text: &str) -> Result<Option<PathBuf>> {
        if text.is_empty() {
            return Ok(None);
        }
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "wav",
        };
        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to connect to TTS server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("TTS error ({status}): {body}");
        }

        let wav_bytes = response
            .bytes()
            .await
            .context("Failed to read TTS response")?;
        let path = self
            .output_dir
            .join(format!("voxlink-tts-{}.wav", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, &wav_bytes)
            .await
            .with_context(|| format!("Failed to write TTS artifact {}", path.display()))?;
        debug!("TTS artifact written: {}", path.display());
        Ok(Some(path))
    }

    fn audio_to_opus_data(&self, path: &Path) -> Result<(Vec<Vec<u8>>, f64)> {
        wav_to_frames(path)
    }

    fn delete_audio_file(&self) -> bool {
        self.delete_audio
    }
}

/// Slice a WAV artifact into fixed-duration PCM frames
pub fn wav_to_frames(path: &Path) -> Result<(Vec<Vec<u8>>, f64)> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open audio artifact {}", path.display()))?;
    let spec = reader.spec();
    let samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .collect::<std::result::Result<_, _>>()
            .context("Failed to decode PCM samples")?,
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|f| (f * 32767.0).clamp(-32768.0, 32767.0) as i16))
            .collect::<std::result::Result<_, _>>()
            .context("Failed to decode float samples")?,
    };

    let samples_per_frame =
        (spec.sample_rate * FRAME_MS / 1000) as usize * spec.channels as usize;
    if samples_per_frame == 0 {
        bail!("Invalid sample rate in artifact {}", path.display());
    }
    let frames: Vec<Vec<u8>> = samples
        .chunks(samples_per_frame)
        .map(|chunk| chunk.iter().flat_map(|s| s.to_le_bytes()).collect())
        .collect();
    let duration =
        samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);
    Ok((frames, duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(path: &Path, samples: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..samples {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_wav_to_frames_slices_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.wav");
        // 16000 Hz * 0.18 s = 2880 samples = three 60 ms frames
        write_test_wav(&path, 2880);
        let (frames, duration) = wav_to_frames(&path).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].len(), 960 * 2);
        assert!((duration - 0.18).abs() < 1e-6);
    }

    #[test]
    fn test_wav_to_frames_partial_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.wav");
        write_test_wav(&path, 1000);
        let (frames, _) = wav_to_frames(&path).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].len(), 40 * 2);
    }

    #[test]
    fn test_missing_artifact_is_error() {
        assert!(wav_to_frames(Path::new("/nonexistent/never.wav")).is_err());
    }

    #[tokio::test]
    async fn test_empty_text_skips_synthesis() {
        let tts = HttpTts::new("http://localhost:1", "v", "m", true);
        assert!(tts.to_tts("").await.unwrap().is_none());
    }
}
