use serde::Serialize;

use super::detector::SpeechDetector;

/// 発話区間の開始/終了（秒、0.1 秒単位に丸め）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechEvent {
    Start { seconds: f32 },
    End { seconds: f32 },
}

/// ストリーミング発話区間検出
///
/// - 確率が閾値以上になった時点で `Start`
/// - 閾値 - 0.15 未満の状態が `min_silence` 以上続いたら `End`
/// - 開始/終了位置は `speech_pad` 分だけ外側に広げる
pub struct VadIterator<D>
where
    D: SpeechDetector,
{
    detector: D,
    threshold: f32,
    sample_rate: u32,
    min_silence_samples: u64,
    speech_pad_samples: u64,
    triggered: bool,
    temp_end: u64,
    current_sample: u64,
}

impl<D> VadIterator<D>
where
    D: SpeechDetector,
{
    pub fn new(
        detector: D,
        threshold: f32,
        sample_rate: u32,
        min_silence_ms: u32,
        speech_pad_ms: u32,
    ) -> Self {
        Self {
            detector,
            threshold,
            sample_rate: sample_rate.max(1),
            min_silence_samples: sample_rate as u64 * min_silence_ms as u64 / 1000,
            speech_pad_samples: sample_rate as u64 * speech_pad_ms as u64 / 1000,
            triggered: false,
            temp_end: 0,
            current_sample: 0,
        }
    }

    pub fn reset(&mut self) {
        self.detector.reset();
        self.triggered = false;
        self.temp_end = 0;
        self.current_sample = 0;
    }

    pub fn is_speaking(&self) -> bool {
        self.triggered
    }

    pub fn process(&mut self, chunk: &[f32]) -> Option<SpeechEvent> {
        let window = chunk.len() as u64;
        self.current_sample += window;
        let probability = self.detector.speech_probability(chunk);

        if probability >= self.threshold && self.temp_end != 0 {
            self.temp_end = 0;
        }

        if probability >= self.threshold && !self.triggered {
            self.triggered = true;
            let start = self
                .current_sample
                .saturating_sub(self.speech_pad_samples + window);
            return Some(SpeechEvent::Start {
                seconds: self.to_seconds(start),
            });
        }

        if probability < self.threshold - 0.15 && self.triggered {
            if self.temp_end == 0 {
                self.temp_end = self.current_sample;
            }
            if self.current_sample - self.temp_end < self.min_silence_samples {
                return None;
            }

            let end = (self.temp_end + self.speech_pad_samples).saturating_sub(window);
            self.temp_end = 0;
            self.triggered = false;
            return Some(SpeechEvent::End {
                seconds: self.to_seconds(end),
            });
        }

        None
    }

    fn to_seconds(&self, samples: u64) -> f32 {
        let seconds = samples as f64 / self.sample_rate as f64;
        ((seconds * 10.0).round() / 10.0) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ブロックの先頭値をそのまま確率として返す
    struct Scripted;

    impl SpeechDetector for Scripted {
        fn speech_probability(&mut self, chunk: &[f32]) -> f32 {
            chunk.first().copied().unwrap_or(0.0)
        }
    }

    fn iterator() -> VadIterator<Scripted> {
        VadIterator::new(Scripted, 0.5, 16_000, 100, 30)
    }

    #[test]
    fn test_start_then_end_after_min_silence() {
        let mut vad = iterator();
        assert_eq!(vad.process(&[0.0; 512]), None);
        assert_eq!(vad.process(&[0.9; 512]), Some(SpeechEvent::Start { seconds: 0.0 }));
        assert!(vad.is_speaking());

        // 100ms = 1600 サンプル。無音開始から 2048 サンプル経過した5ブロック目で終了
        let mut events = Vec::new();
        for _ in 0..5 {
            events.push(vad.process(&[0.0; 512]));
        }
        assert_eq!(events[0], None);
        assert_eq!(events[1], None);
        assert_eq!(events[2], None);
        assert_eq!(events[3], None);
        assert!(matches!(events[4], Some(SpeechEvent::End { .. })));
        assert!(!vad.is_speaking());
    }

    #[test]
    fn test_speech_resuming_cancels_pending_end() {
        let mut vad = iterator();
        vad.process(&[0.9; 512]);
        vad.process(&[0.0; 512]);
        vad.process(&[0.9; 512]);
        for _ in 0..3 {
            assert_eq!(vad.process(&[0.0; 512]), None);
        }
        assert!(vad.is_speaking());
    }

    #[test]
    fn test_hysteresis_band_keeps_speaking() {
        let mut vad = iterator();
        vad.process(&[0.9; 512]);
        for _ in 0..10 {
            assert_eq!(vad.process(&[0.4; 512]), None);
        }
        assert!(vad.is_speaking());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut vad = iterator();
        vad.process(&[0.9; 512]);
        vad.reset();
        assert!(!vad.is_speaking());
        assert_eq!(vad.process(&[0.9; 512]), Some(SpeechEvent::Start { seconds: 0.0 }));
    }

    #[test]
    fn test_start_position_is_padded() {
        let mut vad = iterator();
        for _ in 0..30 {
            vad.process(&[0.0; 512]);
        }
        // 31ブロック目: current = 15872, start = 15872 - 480 - 512 = 14880 → 0.93s → 0.9
        assert_eq!(vad.process(&[0.9; 512]), Some(SpeechEvent::Start { seconds: 0.9 }));
    }
}
