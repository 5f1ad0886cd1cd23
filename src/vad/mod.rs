//! 発話区間検出（VAD）
//!
//! クライアントから届く PCM16 を f32 に変換し、固定長ブロックに切り出して
//! 発話の開始/終了を検出します。検出結果はログ用途で、音声の転送には影響しません。
mod chunker;
mod detector;
mod iterator;
mod pcm;

use crate::config::VadConfig;

pub use chunker::VadChunker;
pub use detector::{rms_dbfs, EnergyDetector, SpeechDetector};
pub use iterator::{SpeechEvent, VadIterator};
pub use pcm::pcm16_to_f32;

/// 変換・ブロック化・検出をまとめた接続単位のモニタ
pub struct VoiceActivityMonitor<D = EnergyDetector>
where
    D: SpeechDetector,
{
    chunker: VadChunker,
    iterator: VadIterator<D>,
}

impl VoiceActivityMonitor<EnergyDetector> {
    pub fn from_config(config: &VadConfig) -> Self {
        Self::with_detector(EnergyDetector::default(), config)
    }
}

impl<D> VoiceActivityMonitor<D>
where
    D: SpeechDetector,
{
    pub fn with_detector(detector: D, config: &VadConfig) -> Self {
        Self {
            chunker: VadChunker::new(config.chunk_samples),
            iterator: VadIterator::new(
                detector,
                config.threshold,
                config.sample_rate_hz,
                config.min_silence_ms,
                config.speech_pad_ms,
            ),
        }
    }

    pub fn push_pcm16(&mut self, bytes: &[u8]) -> Vec<SpeechEvent> {
        let samples = pcm16_to_f32(bytes);
        self.chunker
            .push(&samples)
            .iter()
            .filter_map(|chunk| self.iterator.process(chunk))
            .collect()
    }

    pub fn reset(&mut self) {
        self.chunker.clear();
        self.iterator.reset();
    }

    pub fn is_speaking(&self) -> bool {
        self.iterator.is_speaking()
    }
}
