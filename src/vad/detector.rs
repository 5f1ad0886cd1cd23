/// 1 ブロック分の音声から発話確率 [0, 1] を返す検出器
pub trait SpeechDetector: Send {
    fn speech_probability(&mut self, chunk: &[f32]) -> f32;

    fn reset(&mut self) {}
}

/// RMS レベル（dBFS）を線形に確率へ写像する検出器
///
/// `floor_db` 以下は 0、`ceiling_db` 以上は 1。急な変動を抑えるため指数平滑をかける。
#[derive(Debug, Clone)]
pub struct EnergyDetector {
    floor_db: f32,
    ceiling_db: f32,
    smoothing: f32,
    smoothed: Option<f32>,
}

impl EnergyDetector {
    pub fn new(floor_db: f32, ceiling_db: f32, smoothing: f32) -> Self {
        Self {
            floor_db,
            ceiling_db: ceiling_db.max(floor_db + f32::EPSILON),
            smoothing: smoothing.clamp(0.0, 1.0),
            smoothed: None,
        }
    }
}

impl Default for EnergyDetector {
    fn default() -> Self {
        Self::new(-55.0, -25.0, 0.5)
    }
}

impl SpeechDetector for EnergyDetector {
    fn speech_probability(&mut self, chunk: &[f32]) -> f32 {
        let level = rms_dbfs(chunk);
        let raw = ((level - self.floor_db) / (self.ceiling_db - self.floor_db)).clamp(0.0, 1.0);

        let probability = match self.smoothed {
            Some(previous) => self.smoothing * previous + (1.0 - self.smoothing) * raw,
            None => raw,
        };
        self.smoothed = Some(probability);
        probability
    }

    fn reset(&mut self) {
        self.smoothed = None;
    }
}

pub fn rms_dbfs(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }
    let sum = samples.iter().map(|s| s * s).sum::<f32>();
    let rms = (sum / samples.len() as f32).sqrt();
    if rms == 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * rms.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_is_zero() {
        let mut detector = EnergyDetector::default();
        assert_eq!(detector.speech_probability(&[0.0; 512]), 0.0);
    }

    #[test]
    fn test_loud_block_is_one() {
        let mut detector = EnergyDetector::default();
        assert_eq!(detector.speech_probability(&[0.5; 512]), 1.0);
    }

    #[test]
    fn test_smoothing_and_reset() {
        let mut detector = EnergyDetector::default();
        detector.speech_probability(&[0.5; 512]);
        let smoothed = detector.speech_probability(&[0.0; 512]);
        assert!((smoothed - 0.5).abs() < 1e-6);
        detector.reset();
        assert_eq!(detector.speech_probability(&[0.0; 512]), 0.0);
    }
}
