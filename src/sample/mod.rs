//! sample-level binary diff and patch for decoded audio
//!
//! two buffers of the same sample format are compared value by value and the
//! divergent span is emitted as a pair of little-endian byte streams: the old
//! samples (subtraction) and the new samples (addition). applying the
//! subtraction then the addition to the old sample stream yields the new one.

mod compare;
mod decode;
mod patch;

use std::fmt;

pub use compare::{compare_files, diff_buffers, diff_samples, CompareReport, PatchStream, SampleDiff};
pub use decode::{decode_wav, DecodedAudio};
pub use patch::{apply_patch, apply_patches, PatchName, PatchOp};

/// sample encodings the codec understands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    /// signed 16-bit pcm
    Pcm16,
    /// signed 32-bit pcm
    Pcm32,
    /// 32-bit ieee-754 float
    Float32,
}

impl SampleFormat {
    pub fn bit_depth(self) -> u32 {
        match self {
            SampleFormat::Pcm16 => 16,
            SampleFormat::Pcm32 | SampleFormat::Float32 => 32,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        self.bit_depth() as usize / 8
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleFormat::Pcm16 => f.write_str("16-bit pcm"),
            SampleFormat::Pcm32 => f.write_str("32-bit pcm"),
            SampleFormat::Float32 => f.write_str("32-bit float"),
        }
    }
}

/// interleaved samples, one element per frame-channel
#[derive(Clone, Debug, PartialEq)]
pub enum Samples {
    Pcm16(Vec<i16>),
    Pcm32(Vec<i32>),
    Float32(Vec<f32>),
}

impl Samples {
    pub fn format(&self) -> SampleFormat {
        match self {
            Samples::Pcm16(_) => SampleFormat::Pcm16,
            Samples::Pcm32(_) => SampleFormat::Pcm32,
            Samples::Float32(_) => SampleFormat::Float32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Samples::Pcm16(s) => s.len(),
            Samples::Pcm32(s) => s.len(),
            Samples::Float32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// raw little-endian sample stream
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Samples::Pcm16(s) => encode_samples(s),
            Samples::Pcm32(s) => encode_samples(s),
            Samples::Float32(s) => encode_samples(s),
        }
    }
}

/// a single sample value with a fixed little-endian encoding
pub trait Sample: Copy {
    /// encoded width in bytes
    const WIDTH: usize;

    /// bit-exact equality
    fn same(self, other: Self) -> bool;

    fn write_le(self, out: &mut Vec<u8>);
}

impl Sample for i16 {
    const WIDTH: usize = 2;

    fn same(self, other: Self) -> bool {
        self == other
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl Sample for i32 {
    const WIDTH: usize = 4;

    fn same(self, other: Self) -> bool {
        self == other
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

// floats compare and encode by bit pattern, never by numeric value
impl Sample for f32 {
    const WIDTH: usize = 4;

    fn same(self, other: Self) -> bool {
        self.to_bits() == other.to_bits()
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bits().to_le_bytes());
    }
}

/// encode a run of samples as a little-endian byte stream
pub fn encode_samples<S: Sample>(samples: &[S]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * S::WIDTH);
    for s in samples {
        s.write_le(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_i16_little_endian() {
        assert_eq!(encode_samples(&[1i16, -2]), vec![0x01, 0x00, 0xfe, 0xff]);
    }

    #[test]
    fn test_encode_i32_little_endian() {
        assert_eq!(encode_samples(&[0x0102_0304i32]), vec![0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_encode_f32_is_bit_reinterpretation() {
        // 1.0f32 == 0x3f800000
        assert_eq!(encode_samples(&[1.0f32]), vec![0x00, 0x00, 0x80, 0x3f]);
    }

    #[test]
    fn test_float_same_uses_bits() {
        assert!(!0.0f32.same(-0.0));
        assert!(f32::NAN.same(f32::NAN));
    }

    #[test]
    fn test_format_widths() {
        assert_eq!(SampleFormat::Pcm16.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::Pcm32.bytes_per_sample(), 4);
        assert_eq!(SampleFormat::Float32.bit_depth(), 32);
        assert_eq!(Samples::Pcm32(vec![1, 2, 3]).to_bytes().len(), 12);
    }
}
