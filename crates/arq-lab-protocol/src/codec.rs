//! Frame-integrity codecs that can be plugged in around the channel.

use anyhow::Result;
use arq_lab_abstract::{CodecError, Decoded, FrameCodec};
use tracing::debug;

/// Passes payload bytes through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCodec;

impl FrameCodec for IdentityCodec {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn encode(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn decode(&self, codeword: &[u8]) -> Result<Decoded, CodecError> {
        Ok(Decoded {
            data: codeword.to_vec(),
            corrected: false,
        })
    }
}

/// Hamming(7,4) single-error-correcting block code.
///
/// Every byte becomes two 7-bit blocks (high nibble first), one block per
/// output byte. Block bit `i` (0-based, LSB first) is codeword position
/// `i + 1`; parity sits at positions 1, 2 and 4.
#[derive(Debug, Default, Clone, Copy)]
pub struct Hamming74;

impl Hamming74 {
    fn encode_nibble(nibble: u8) -> u8 {
        let d1 = (nibble >> 3) & 1;
        let d2 = (nibble >> 2) & 1;
        let d3 = (nibble >> 1) & 1;
        let d4 = nibble & 1;
        let p1 = d1 ^ d2 ^ d4;
        let p2 = d1 ^ d3 ^ d4;
        let p3 = d2 ^ d3 ^ d4;
        p1 | (p2 << 1) | (d1 << 2) | (p3 << 3) | (d2 << 4) | (d3 << 5) | (d4 << 6)
    }

    /// Returns the corrected nibble and whether a bit was flipped.
    fn decode_block(block: u8) -> (u8, bool) {
        let bit = |pos: u8| (block >> (pos - 1)) & 1;
        let s1 = bit(1) ^ bit(3) ^ bit(5) ^ bit(7);
        let s2 = bit(2) ^ bit(3) ^ bit(6) ^ bit(7);
        let s3 = bit(4) ^ bit(5) ^ bit(6) ^ bit(7);
        let error_pos = s1 | (s2 << 1) | (s3 << 2);

        let fixed = if error_pos == 0 {
            block
        } else {
            block ^ (1 << (error_pos - 1))
        };
        let nibble = (((fixed >> 2) & 1) << 3)
            | (((fixed >> 4) & 1) << 2)
            | (((fixed >> 5) & 1) << 1)
            | ((fixed >> 6) & 1);
        (nibble, error_pos != 0)
    }
}

impl FrameCodec for Hamming74 {
    fn name(&self) -> &'static str {
        "hamming74"
    }

    fn encode(&self, data: &[u8]) -> Vec<u8> {
        data.iter()
            .flat_map(|&byte| [Self::encode_nibble(byte >> 4), Self::encode_nibble(byte & 0x0F)])
            .collect()
    }

    fn decode(&self, codeword: &[u8]) -> Result<Decoded, CodecError> {
        if codeword.len() % 2 != 0 {
            return Err(CodecError::TruncatedCodeword {
                len: codeword.len(),
            });
        }
        if let Some((index, &value)) = codeword.iter().enumerate().find(|(_, b)| **b & 0x80 != 0) {
            return Err(CodecError::InvalidCodeword { index, value });
        }

        let mut corrected = false;
        let data = codeword
            .chunks_exact(2)
            .map(|pair| {
                let (high, fixed_high) = Self::decode_block(pair[0]);
                let (low, fixed_low) = Self::decode_block(pair[1]);
                corrected |= fixed_high || fixed_low;
                (high << 4) | low
            })
            .collect();
        if corrected {
            debug!("hamming74 corrected a single-bit error");
        }
        Ok(Decoded { data, corrected })
    }
}

/// Look up a codec by its user-visible name.
pub fn codec_by_name(name: &str) -> Result<Box<dyn FrameCodec>> {
    match name {
        "hamming74" => Ok(Box::new(Hamming74)),
        "identity" => Ok(Box::new(IdentityCodec)),
        other => anyhow::bail!("Unknown codec '{other}'. Try 'hamming74' or 'identity'."),
    }
}
