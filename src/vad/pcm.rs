/// リトルエンディアン PCM16 を f32 に変換
///
/// 振幅が 0 でない場合のみ 32768 で割り [-1, 1] に正規化する（無音はそのまま 0.0）。
/// 末尾の半端な 1 バイトは捨てる。
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect::<Vec<_>>();

    let abs_max = samples
        .iter()
        .map(|s| (*s as i32).abs())
        .max()
        .unwrap_or(0);

    if abs_max > 0 {
        samples.iter().map(|s| *s as f32 / 32768.0).collect()
    } else {
        samples.iter().map(|s| *s as f32).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_full_scale() {
        let bytes = [i16::MIN.to_le_bytes(), 16384_i16.to_le_bytes()].concat();
        assert_eq!(pcm16_to_f32(&bytes), vec![-1.0, 0.5]);
    }

    #[test]
    fn test_silence_and_odd_byte() {
        let bytes = [0_u8, 0, 0, 0, 7];
        assert_eq!(pcm16_to_f32(&bytes), vec![0.0, 0.0]);
        assert!(pcm16_to_f32(&[]).is_empty());
    }
}
