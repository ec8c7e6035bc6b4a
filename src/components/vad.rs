//! Voice-activity detection capability

use std::sync::Arc;

use crate::config::ModuleConfig;

/// Voice-activity detection over PCM frames
pub trait Vad: Send + Sync {
    /// Whether the frame contains speech
    fn is_speech(&self, frame: &[i16]) -> bool;
}

/// Shared handle to a swappable VAD
pub type VadHandle = Arc<dyn Vad>;

/// RMS-energy detector
pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn from_module_config(cfg: &ModuleConfig) -> Self {
        let threshold = cfg.f64_option("threshold").unwrap_or(200.0) as f32;
        Self::new(threshold)
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(200.0)
    }
}

impl Vad for EnergyVad {
    fn is_speech(&self, frame: &[i16]) -> bool {
        rms_energy(frame) > self.threshold
    }
}

/// Compute RMS energy of audio samples
pub fn rms_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&s| (s as f32).powi(2)).sum::<f32>() / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_energy() {
        assert_eq!(rms_energy(&[]), 0.0);
        assert!(rms_energy(&[1000, -1000, 1000, -1000]) > 900.0);
        assert!(rms_energy(&[0, 0, 0, 0]) < 1.0);
    }

    #[test]
    fn test_energy_vad_threshold() {
        let vad = EnergyVad::new(200.0);
        assert!(vad.is_speech(&[1000, -1000, 1000, -1000]));
        assert!(!vad.is_speech(&[10, -10, 10, -10]));
    }
}
