//! PCM16 audio codec and transport encoding.
//!
//! The relay carries linear 16-bit PCM at 24 kHz mono in both directions.
//! Samples cross the wire base64-encoded inside JSON frames; internally they
//! are handled as `f32` in [-1.0, 1.0].
//!
//! The float scaling is asymmetric: negative samples divide by 32768, all
//! others by 32767. Both directions must use the same split so that
//! encode(decode(bytes)) round-trips within one least-significant bit.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;

use crate::errors::{RelayError, RelayResult};

/// Sample rate used on both links.
pub const SAMPLE_RATE_HZ: u32 = 24_000;

/// Bytes per PCM16 sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// PCM bytes per second of audio at [`SAMPLE_RATE_HZ`] mono.
pub const BYTES_PER_SECOND: f64 = (SAMPLE_RATE_HZ as usize * BYTES_PER_SAMPLE) as f64;

// =============================================================================
// PCM16 <-> f32
// =============================================================================

/// Decode little-endian PCM16 bytes into float samples.
///
/// Negative samples are divided by 32768, non-negative by 32767, matching
/// the scaling used when encoding.
///
/// # Arguments
/// * `bytes` - Raw PCM16 little-endian data; length must be a multiple of 2
///
/// # Returns
/// * `RelayResult<Vec<f32>>` - Samples in [-1.0, 1.0], or `CodecFailure`
pub fn decode_pcm16(bytes: &[u8]) -> RelayResult<Vec<f32>> {
    if bytes.len() % BYTES_PER_SAMPLE != 0 {
        return Err(RelayError::CodecFailure(format!(
            "PCM16 payload length {} is not a multiple of {}",
            bytes.len(),
            BYTES_PER_SAMPLE
        )));
    }

    let samples = bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| {
            let value = i16::from_le_bytes([pair[0], pair[1]]);
            if value < 0 {
                f32::from(value) / 32768.0
            } else {
                f32::from(value) / 32767.0
            }
        })
        .collect();

    Ok(samples)
}

/// Encode float samples into little-endian PCM16 bytes.
///
/// Samples are clamped to [-1.0, 1.0] before scaling; negative samples
/// multiply by 32768, non-negative by 32767.
pub fn encode_pcm16(samples: &[f32]) -> Bytes {
    let mut out = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = if clamped < 0.0 {
            (clamped * 32768.0) as i16
        } else {
            (clamped * 32767.0) as i16
        };
        out.extend_from_slice(&value.to_le_bytes());
    }
    Bytes::from(out)
}

// =============================================================================
// Transport encoding
// =============================================================================

/// Encode raw audio bytes into the text-safe transport form (base64).
pub fn encode_transport(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode the text-safe transport form back into raw audio bytes.
///
/// # Returns
/// * `RelayResult<Bytes>` - The exact original bytes, or `CodecFailure`
pub fn decode_transport(encoded: &str) -> RelayResult<Bytes> {
    BASE64
        .decode(encoded)
        .map(Bytes::from)
        .map_err(|e| RelayError::CodecFailure(format!("invalid transport encoding: {e}")))
}

// =============================================================================
// Duration estimation
// =============================================================================

/// Estimate the playback duration of a PCM16 payload from its byte length.
///
/// This is the accounting estimate used for audio-second counters; it
/// assumes [`SAMPLE_RATE_HZ`] mono PCM16.
pub fn estimated_seconds(byte_len: usize) -> f64 {
    byte_len as f64 / BYTES_PER_SECOND
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Generate one second of a 440 Hz sine as PCM16 bytes.
    fn sine_pcm16(len_samples: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(len_samples * 2);
        for i in 0..len_samples {
            let t = i as f32 / SAMPLE_RATE_HZ as f32;
            let sample = (0.7 * (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 32767.0) as i16;
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_decode_scaling_asymmetry() {
        // -32768 -> -1.0 exactly, 32767 -> 1.0 exactly
        let bytes = [0x00, 0x80, 0xFF, 0x7F, 0x00, 0x00];
        let samples = decode_pcm16(&bytes).unwrap();
        assert_eq!(samples, vec![-1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        let bytes = encode_pcm16(&[2.0, -2.0, 1.0, -1.0]);
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(values, vec![32767, -32768, 32767, -32768]);
    }

    #[test]
    fn test_round_trip_within_one_lsb() {
        let original = sine_pcm16(2400);
        let decoded = decode_pcm16(&original).unwrap();
        let encoded = encode_pcm16(&decoded);
        assert_eq!(encoded.len(), original.len());

        for (a, b) in original.chunks_exact(2).zip(encoded.chunks_exact(2)) {
            let va = i16::from_le_bytes([a[0], a[1]]) as i32;
            let vb = i16::from_le_bytes([b[0], b[1]]) as i32;
            assert!(
                (va - vb).abs() <= 1,
                "sample drifted more than 1 LSB: {va} vs {vb}"
            );
        }
    }

    #[test]
    fn test_round_trip_extremes() {
        let original: Vec<u8> = [i16::MIN, -1, 0, 1, i16::MAX]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let encoded = encode_pcm16(&decode_pcm16(&original).unwrap());
        for (a, b) in original.chunks_exact(2).zip(encoded.chunks_exact(2)) {
            let va = i16::from_le_bytes([a[0], a[1]]) as i32;
            let vb = i16::from_le_bytes([b[0], b[1]]) as i32;
            assert!((va - vb).abs() <= 1);
        }
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        let result = decode_pcm16(&[0x01, 0x02, 0x03]);
        assert!(matches!(result, Err(RelayError::CodecFailure(_))));
    }

    #[test]
    fn test_decode_empty_is_empty() {
        assert!(decode_pcm16(&[]).unwrap().is_empty());
        assert!(encode_pcm16(&[]).is_empty());
    }

    #[test]
    fn test_transport_round_trip_exact() {
        let original = sine_pcm16(777);
        let encoded = encode_transport(&original);
        let decoded = decode_transport(&encoded).unwrap();
        assert_eq!(decoded.as_ref(), original.as_slice());
    }

    #[test]
    fn test_transport_rejects_invalid_input() {
        let result = decode_transport("not base64!!!");
        assert!(matches!(result, Err(RelayError::CodecFailure(_))));
    }

    #[test]
    fn test_estimated_seconds() {
        // One second of 24kHz mono PCM16 is 48000 bytes.
        assert!((estimated_seconds(48_000) - 1.0).abs() < f64::EPSILON);
        assert!((estimated_seconds(4_800) - 0.1).abs() < f64::EPSILON);
        assert_eq!(estimated_seconds(0), 0.0);
    }
}
