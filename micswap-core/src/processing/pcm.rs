//! PCM sample-format primitives.
//!
//! The external provider only ever produces 16-bit integer PCM. Sessions
//! whose native format is floating point are synthesized into a temporary
//! 16-bit buffer of equal sample count and normalized here.

use crate::models::session::SampleFormat;

/// Bytes in one frame: channel count × sample width.
pub fn bytes_per_frame(format: SampleFormat, channel_count: i32) -> usize {
    channel_count.max(0) as usize * format.bytes_per_sample()
}

/// Normalize 16-bit signed samples into `[-1.0, 1.0)`.
///
/// Writes `min(src.len(), dst.len())` samples.
pub fn i16_to_f32(src: &[i16], dst: &mut [f32]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = s as f32 / 32768.0;
    }
}

/// Normalize little-endian 16-bit PCM bytes into `[-1.0, 1.0)`.
pub fn i16_bytes_to_f32(bytes: &[u8], dst: &mut [f32]) {
    for (d, pair) in dst.iter_mut().zip(bytes.chunks_exact(2)) {
        *d = i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn full_scale_negative_maps_to_minus_one() {
        let mut out = [0.0f32; 1];
        i16_to_f32(&[i16::MIN], &mut out);
        assert_abs_diff_eq!(out[0], -1.0);
    }

    #[test]
    fn full_scale_positive_stays_below_one() {
        let mut out = [0.0f32; 1];
        i16_to_f32(&[i16::MAX], &mut out);
        assert_abs_diff_eq!(out[0], 32767.0 / 32768.0);
        assert!(out[0] < 1.0);
    }

    #[test]
    fn zero_maps_to_zero() {
        let mut out = [1.0f32; 1];
        i16_to_f32(&[0], &mut out);
        assert_abs_diff_eq!(out[0], 0.0);
    }

    #[test]
    fn byte_variant_matches_sample_variant() {
        let samples: [i16; 4] = [-32768, -1, 1, 32767];
        let mut bytes = Vec::new();
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }

        let mut from_samples = [0.0f32; 4];
        let mut from_bytes = [0.0f32; 4];
        i16_to_f32(&samples, &mut from_samples);
        i16_bytes_to_f32(&bytes, &mut from_bytes);
        assert_eq!(from_samples, from_bytes);
    }

    #[test]
    fn frame_sizing_per_format() {
        assert_eq!(bytes_per_frame(SampleFormat::Int16, 1), 2);
        assert_eq!(bytes_per_frame(SampleFormat::Int16, 2), 4);
        assert_eq!(bytes_per_frame(SampleFormat::Float32, 2), 8);
        assert_eq!(bytes_per_frame(SampleFormat::Int16, -1), 0);
    }
}
