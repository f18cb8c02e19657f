//! PCM payload decoding and stream format constants.
//!
//! The receiver hands over raw 16-bit little-endian PCM; compressed
//! payloads are decoded upstream and never reach this crate.

use crate::error::DecodeError;

/// Default sample rate (CD quality, the AirPlay ALAC/PCM rate).
pub const SAMPLE_RATE: u32 = 44_100;

/// Default number of interleaved channels (stereo).
pub const CHANNELS: u16 = 2;

/// Default sample frames per render block.
pub const FRAMES_PER_BLOCK: u32 = 1024;

/// Decodes a little-endian 16-bit PCM payload into samples.
///
/// # Errors
///
/// Returns [`DecodeError::OddLength`] if the payload does not hold a whole
/// number of samples.
pub fn decode_pcm_le(payload: &[u8]) -> Result<Vec<i16>, DecodeError> {
    // ---
    if payload.len() % 2 != 0 {
        return Err(DecodeError::OddLength(payload.len()));
    }

    Ok(payload
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Copies a frame's samples into a render block.
///
/// The block must be filled completely; if the payload is shorter, the
/// available prefix is copied, the rest of `out` is left untouched and a
/// [`DecodeError::ShortPayload`] is returned. Extra samples are ignored.
pub fn copy_block(samples: &[i16], out: &mut [i16]) -> Result<(), DecodeError> {
    // ---
    let n = samples.len().min(out.len());
    out[..n].copy_from_slice(&samples[..n]);

    if n < out.len() {
        return Err(DecodeError::ShortPayload {
            expected: out.len(),
            actual: samples.len(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_decode_little_endian() {
        // ---
        let payload = [0x34, 0x12, 0x00, 0x80, 0xff, 0x7f];
        let samples = decode_pcm_le(&payload).unwrap();
        assert_eq!(samples, vec![0x1234, i16::MIN, i16::MAX]);
    }

    #[test]
    fn test_decode_empty_payload() {
        // ---
        assert!(decode_pcm_le(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_decode_odd_length() {
        // ---
        assert_eq!(decode_pcm_le(&[1, 2, 3]), Err(DecodeError::OddLength(3)));
    }

    #[test]
    fn test_copy_block_exact_and_longer() {
        // ---
        let mut out = [0i16; 4];
        copy_block(&[1, 2, 3, 4, 5, 6], &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_copy_block_short_payload_leaves_tail() {
        // ---
        let mut out = [9i16; 4];
        let err = copy_block(&[1, 2], &mut out).unwrap_err();

        assert_eq!(
            err,
            DecodeError::ShortPayload {
                expected: 4,
                actual: 2
            }
        );
        assert_eq!(out, [1, 2, 9, 9]);
    }
}
