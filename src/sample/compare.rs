use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::decode::decode_wav;
use super::patch::{PatchName, PatchOp};
use super::{encode_samples, Sample, Samples};
use crate::error::{Error, IoResultExt, Result};

/// one side of a sample diff: bytes spliced at a byte offset
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatchStream {
    pub offset: u64,
    pub data: Vec<u8>,
}

impl PatchStream {
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// subtraction (old bytes) and addition (new bytes) for one divergent span
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleDiff {
    pub subtractions: PatchStream,
    pub additions: PatchStream,
}

impl SampleDiff {
    pub fn is_empty(&self) -> bool {
        self.subtractions.is_empty() && self.additions.is_empty()
    }

    /// apply to a raw old sample stream: remove the subtraction span, then
    /// insert the addition at the same offset
    pub fn apply_to(&self, old: &[u8]) -> Vec<u8> {
        let at = self.subtractions.offset as usize;
        let mut out = Vec::with_capacity(old.len() + self.additions.data.len());
        out.extend_from_slice(&old[..at.min(old.len())]);
        out.extend_from_slice(&self.additions.data);
        let resume = (at + self.subtractions.data.len()).min(old.len());
        out.extend_from_slice(&old[resume..]);
        out
    }
}

/// compare two sample sequences index by index.
///
/// the divergent span runs from the first index where the values differ (or
/// one side has ended) to the last such index. the subtraction carries the old
/// samples of that span and the addition the new ones, both starting at the
/// span's byte offset. equal samples outside the span contribute nothing;
/// identical inputs give an empty diff.
pub fn diff_samples<S: Sample>(old: &[S], new: &[S]) -> SampleDiff {
    let longest = old.len().max(new.len());
    let differs = |i: usize| match (old.get(i), new.get(i)) {
        (Some(a), Some(b)) => !a.same(*b),
        _ => true,
    };

    let Some(first) = (0..longest).find(|&i| differs(i)) else {
        return SampleDiff::default();
    };
    // first is a hit, so rfind always succeeds
    let last = (first..longest).rfind(|&i| differs(i)).unwrap_or(first) + 1;

    let offset = (first * S::WIDTH) as u64;
    let span = |samples: &[S]| -> Vec<u8> {
        if first >= samples.len() {
            return Vec::new();
        }
        encode_samples(&samples[first..last.min(samples.len())])
    };

    SampleDiff {
        subtractions: PatchStream {
            offset,
            data: span(old),
        },
        additions: PatchStream {
            offset,
            data: span(new),
        },
    }
}

/// diff two decoded buffers of the same format
pub fn diff_buffers(old: &Samples, new: &Samples) -> Result<SampleDiff> {
    match (old, new) {
        (Samples::Pcm16(a), Samples::Pcm16(b)) => Ok(diff_samples(a, b)),
        (Samples::Pcm32(a), Samples::Pcm32(b)) => Ok(diff_samples(a, b)),
        (Samples::Float32(a), Samples::Float32(b)) => Ok(diff_samples(a, b)),
        _ => Err(Error::FormatMismatch {
            old: old.format(),
            new: new.format(),
        }),
    }
}

/// result of comparing two audio files on disk
#[derive(Clone, Debug, Default)]
pub struct CompareReport {
    pub diff: SampleDiff,
    /// artifacts written, subtraction first
    pub artifacts: Vec<PathBuf>,
}

/// decode two wav files, diff their samples and write one artifact per
/// non-empty stream into `out_dir`
pub fn compare_files(old: &Path, new: &Path, out_dir: &Path) -> Result<CompareReport> {
    let old_audio = decode_wav(old)?;
    let new_audio = decode_wav(new)?;

    let diff = diff_buffers(&old_audio.samples, &new_audio.samples)?;
    debug!(
        old = %old.display(),
        new = %new.display(),
        subtractions = diff.subtractions.len(),
        additions = diff.additions.len(),
        "compared samples"
    );

    let mut report = CompareReport {
        diff,
        artifacts: Vec::new(),
    };
    if report.diff.is_empty() {
        return Ok(report);
    }

    fs::create_dir_all(out_dir).with_path(out_dir)?;
    let base = artifact_base(old);

    for (op, stream) in [
        (PatchOp::Subtract, &report.diff.subtractions),
        (PatchOp::Add, &report.diff.additions),
    ] {
        if stream.is_empty() {
            continue;
        }
        let name = PatchName {
            base: base.clone(),
            op,
            offset: stream.offset,
            length: stream.len(),
        };
        let path = out_dir.join(name.file_name());
        fs::write(&path, &stream.data).with_path(&path)?;
        report.artifacts.push(path);
    }

    Ok(report)
}

// underscores separate the fields of a patch name, so they cannot appear in the base
fn artifact_base(old: &Path) -> String {
    let stem = old
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    stem.replace('_', "-")
}
