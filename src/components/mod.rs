//! Pluggable session components
//!
//! VAD, ASR, LLM, TTS, memory, and intent are capabilities behind trait
//! objects. The session holds the current handle for each; workers and the
//! dialog engine re-read the handle every time they need one, so a private
//! configuration overlay can swap implementations mid-session.

pub mod asr;
pub mod intent;
pub mod llm;
pub mod memory;
pub mod tts;
pub mod vad;

use anyhow::{bail, Result};
use std::sync::{Arc, RwLock};

use crate::config::{Config, ModuleConfig, OverriddenModules};

pub use asr::{Asr, AsrHandle, HttpAsr};
pub use intent::{Intent, IntentHandle, IntentKind, LlmIntent, NoIntent};
pub use llm::{Llm, LlmEvent, LlmHandle, OpenAiLlm};
pub use memory::{Memory, MemoryHandle, NoMemory, SummaryMemory};
pub use tts::{HttpTts, Tts, TtsHandle};
pub use vad::{EnergyVad, Vad, VadHandle};

/// Current component handles for one session.
///
/// Readers clone the inner `Arc`, so a swap never interrupts an operation
/// already in flight; it only affects the next read.
pub struct ComponentHandles {
    vad: RwLock<VadHandle>,
    asr: RwLock<AsrHandle>,
    llm: RwLock<LlmHandle>,
    tts: RwLock<TtsHandle>,
    memory: RwLock<MemoryHandle>,
    intent: RwLock<IntentHandle>,
}

impl ComponentHandles {
    pub fn new(
        vad: VadHandle,
        asr: AsrHandle,
        llm: LlmHandle,
        tts: TtsHandle,
        memory: MemoryHandle,
        intent: IntentHandle,
    ) -> Self {
        Self {
            vad: RwLock::new(vad),
            asr: RwLock::new(asr),
            llm: RwLock::new(llm),
            tts: RwLock::new(tts),
            memory: RwLock::new(memory),
            intent: RwLock::new(intent),
        }
    }

    /// Construct all components from the server configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let vad = match config.selected(&config.selected_module.vad, &config.vad) {
            Some((name, cfg)) => build_vad(name, cfg)?,
            None => Arc::new(EnergyVad::default()),
        };
        let asr = match config.selected(&config.selected_module.asr, &config.asr) {
            Some((name, cfg)) => build_asr(name, cfg)?,
            None => bail!("No ASR module selected"),
        };
        let llm = match config.selected(&config.selected_module.llm, &config.llm) {
            Some((name, cfg)) => build_llm(name, cfg)?,
            None => bail!("No LLM module selected"),
        };
        let tts = match config.selected(&config.selected_module.tts, &config.tts) {
            Some((name, cfg)) => build_tts(name, cfg, config.delete_audio)?,
            None => bail!("No TTS module selected"),
        };
        let memory = match config.selected(&config.selected_module.memory, &config.memory) {
            Some((name, cfg)) => build_memory(name, cfg)?,
            None => Arc::new(NoMemory),
        };
        let intent = match config.selected(&config.selected_module.intent, &config.intent) {
            Some((name, cfg)) => build_intent(name, cfg)?.0,
            None => Arc::new(NoIntent),
        };
        Ok(Self::new(vad, asr, llm, tts, memory, intent))
    }

    pub fn vad(&self) -> VadHandle {
        self.vad.read().expect("vad lock").clone()
    }

    pub fn asr(&self) -> AsrHandle {
        self.asr.read().expect("asr lock").clone()
    }

    pub fn llm(&self) -> LlmHandle {
        self.llm.read().expect("llm lock").clone()
    }

    pub fn tts(&self) -> TtsHandle {
        self.tts.read().expect("tts lock").clone()
    }

    pub fn memory(&self) -> MemoryHandle {
        self.memory.read().expect("memory lock").clone()
    }

    pub fn intent(&self) -> IntentHandle {
        self.intent.read().expect("intent lock").clone()
    }

    pub fn set_vad(&self, handle: VadHandle) {
        *self.vad.write().expect("vad lock") = handle;
    }

    pub fn set_asr(&self, handle: AsrHandle) {
        *self.asr.write().expect("asr lock") = handle;
    }

    pub fn set_llm(&self, handle: LlmHandle) {
        *self.llm.write().expect("llm lock") = handle;
    }

    pub fn set_tts(&self, handle: TtsHandle) {
        *self.tts.write().expect("tts lock") = handle;
    }

    pub fn set_memory(&self, handle: MemoryHandle) {
        *self.memory.write().expect("memory lock") = handle;
    }

    pub fn set_intent(&self, handle: IntentHandle) {
        *self.intent.write().expect("intent lock") = handle;
    }

    /// Re-initialize only the kinds a private overlay touched
    pub fn reinitialize(&self, config: &Config, touched: OverriddenModules) -> Result<()> {
        if touched.vad {
            if let Some((name, cfg)) = config.selected(&config.selected_module.vad, &config.vad)
            {
                self.set_vad(build_vad(name, cfg)?);
            }
        }
        if touched.asr {
            if let Some((name, cfg)) = config.selected(&config.selected_module.asr, &config.asr)
            {
                self.set_asr(build_asr(name, cfg)?);
            }
        }
        if touched.llm {
            if let Some((name, cfg)) = config.selected(&config.selected_module.llm, &config.llm)
            {
                self.set_llm(build_llm(name, cfg)?);
            }
        }
        if touched.tts {
            if let Some((name, cfg)) = config.selected(&config.selected_module.tts, &config.tts)
            {
                self.set_tts(build_tts(name, cfg, config.delete_audio)?);
            }
        }
        if touched.memory {
            if let Some((name, cfg)) =
                config.selected(&config.selected_module.memory, &config.memory)
            {
                self.set_memory(build_memory(name, cfg)?);
            }
        }
        if touched.intent {
            if let Some((name, cfg)) =
                config.selected(&config.selected_module.intent, &config.intent)
            {
                self.set_intent(build_intent(name, cfg)?.0);
            }
        }
        Ok(())
    }
}

pub fn build_vad(name: &str, cfg: &ModuleConfig) -> Result<VadHandle> {
    match cfg.kind_or(name) {
        "energy" => Ok(Arc::new(EnergyVad::from_module_config(cfg))),
        other => bail!("Unknown VAD type '{other}'"),
    }
}

pub fn build_asr(name: &str, cfg: &ModuleConfig) -> Result<AsrHandle> {
    match cfg.kind_or(name) {
        "http" => Ok(Arc::new(HttpAsr::from_module_config(name, cfg)?)),
        other => bail!("Unknown ASR type '{other}'"),
    }
}

pub fn build_llm(name: &str, cfg: &ModuleConfig) -> Result<LlmHandle> {
    match cfg.kind_or(name) {
        "openai" => Ok(Arc::new(OpenAiLlm::from_module_config(name, cfg)?)),
        other => bail!("Unknown LLM type '{other}'"),
    }
}

pub fn build_tts(name: &str, cfg: &ModuleConfig, delete_audio: bool) -> Result<TtsHandle> {
    match cfg.kind_or(name) {
        "http" => Ok(Arc::new(HttpTts::from_module_config(name, cfg, delete_audio)?)),
        other => bail!("Unknown TTS type '{other}'"),
    }
}

pub fn build_memory(name: &str, cfg: &ModuleConfig) -> Result<MemoryHandle> {
    match cfg.kind_or(name) {
        "nomem" => Ok(Arc::new(NoMemory)),
        "summary" => Ok(Arc::new(SummaryMemory::new())),
        other => bail!("Unknown Memory type '{other}'"),
    }
}

/// Build an intent recognizer and report the configured backend kind
pub fn build_intent(name: &str, cfg: &ModuleConfig) -> Result<(IntentHandle, IntentKind)> {
    let kind = IntentKind::parse(cfg.kind_or(name));
    let handle: IntentHandle = match kind {
        IntentKind::IntentLlm => Arc::new(LlmIntent::new()),
        _ => Arc::new(NoIntent),
    };
    Ok((handle, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_types_rejected() {
        let mut cfg = ModuleConfig::default();
        cfg.kind = Some("quantum".to_string());
        assert!(build_vad("v", &cfg).is_err());
        assert!(build_llm("l", &cfg).is_err());
        assert!(build_memory("m", &cfg).is_err());
    }

    #[test]
    fn test_memory_backends() {
        let mut cfg = ModuleConfig::default();
        cfg.kind = Some("nomem".to_string());
        assert!(build_memory("m", &cfg).is_ok());
        cfg.kind = Some("summary".to_string());
        assert!(build_memory("m", &cfg).is_ok());
    }

    #[test]
    fn test_intent_kind_reported() {
        let mut cfg = ModuleConfig::default();
        cfg.kind = Some("function_call".to_string());
        let (_, kind) = build_intent("i", &cfg).unwrap();
        assert_eq!(kind, IntentKind::FunctionCall);
    }

    #[test]
    fn test_handle_swap_visible_to_next_read() {
        let handles = ComponentHandles::new(
            Arc::new(EnergyVad::new(100.0)),
            Arc::new(HttpAsr::new("http://a")),
            Arc::new(OpenAiLlm::new("http://l", None, "m")),
            Arc::new(HttpTts::new("http://t", "v", "m", true)),
            Arc::new(NoMemory),
            Arc::new(NoIntent),
        );
        let before = handles.vad();
        handles.set_vad(Arc::new(EnergyVad::new(500.0)));
        let after = handles.vad();
        assert!(!Arc::ptr_eq(&before, &after));
    }
}
