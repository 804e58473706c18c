use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{
    Decoder, DecoderOptions, CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_S32LE,
};
use symphonia::core::conv::ConvertibleSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{trace, warn};

use super::{SampleFormat, Samples};
use crate::error::{Error, IoResultExt, Result};

/// fully decoded audio file
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: usize,
    pub samples: Samples,
}

impl DecodedAudio {
    pub fn format(&self) -> SampleFormat {
        self.samples.format()
    }
}

/// decode every sample of a wav file in its native format
pub fn decode_wav(path: &Path) -> Result<DecodedAudio> {
    let file = File::open(path).with_path(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("wav");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| unsupported(path, e))?;
    let mut reader = probed.format;

    let track = reader
        .default_track()
        .ok_or_else(|| unsupported(path, "no audio track"))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let format = match params.codec {
        CODEC_TYPE_PCM_S16LE => SampleFormat::Pcm16,
        CODEC_TYPE_PCM_S32LE => SampleFormat::Pcm32,
        CODEC_TYPE_PCM_F32LE => SampleFormat::Float32,
        _ => {
            let bits = params
                .bits_per_sample
                .map(|b| format!("{}-bit", b))
                .unwrap_or_else(|| "unknown depth".to_string());
            return Err(unsupported(
                path,
                format!("unsupported sample encoding ({})", bits),
            ));
        }
    };

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| unsupported(path, e))?;

    let source = Source {
        path,
        track_id,
        reader: &mut reader,
        decoder: decoder.as_mut(),
    };
    let samples = match format {
        SampleFormat::Pcm16 => Samples::Pcm16(source.collect()?),
        SampleFormat::Pcm32 => Samples::Pcm32(source.collect()?),
        SampleFormat::Float32 => Samples::Float32(source.collect()?),
    };

    trace!(path = %path.display(), format = %format, samples = samples.len(), "decoded audio");

    Ok(DecodedAudio {
        sample_rate: params.sample_rate.unwrap_or_default(),
        channels: params.channels.map(|c| c.count()).unwrap_or(1),
        samples,
    })
}

struct Source<'a> {
    path: &'a Path,
    track_id: u32,
    reader: &'a mut Box<dyn FormatReader>,
    decoder: &'a mut dyn Decoder,
}

impl Source<'_> {
    /// drain every packet of the track into an interleaved buffer
    fn collect<S: ConvertibleSample>(mut self) -> Result<Vec<S>> {
        let mut out = Vec::new();

        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break
                }
                Err(e) => return Err(unsupported(self.path, e)),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let mut buf = SampleBuffer::<S>::new(decoded.capacity() as u64, *decoded.spec());
                    buf.copy_interleaved_ref(decoded);
                    out.extend_from_slice(buf.samples());
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(path = %self.path.display(), error = e, "skipping undecodable packet");
                }
                Err(e) => return Err(unsupported(self.path, e)),
            }
        }

        Ok(out)
    }
}

fn unsupported(path: &Path, message: impl ToString) -> Error {
    Error::UnsupportedAudio {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}
