use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// A decoded recording. `samples` stay interleaved when `channels > 1`.
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl AudioData {
    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }
}

/// Decode the first playable track of `path` into interleaved f32 samples.
pub fn decode_audio(path: &Path) -> Result<AudioData> {
    let mut format = open_format(path)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio tracks found")?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;
    let mut audio = AudioData {
        samples: Vec::new(),
        sample_rate,
        channels: track.codec_params.channels.map_or(1, |c| c.count()),
    };

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut skipped = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("Skipping corrupt packet: {}", msg);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        audio.channels = spec.channels.count();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        audio.samples.extend_from_slice(buf.samples());
    }

    if skipped > 0 {
        log::warn!("{}: skipped {} undecodable packet(s)", path.display(), skipped);
    }
    log::info!(
        "Decoded audio: {} frames, {}Hz, {} channel(s), {:.1}s",
        audio.samples.len() / audio.channels.max(1),
        audio.sample_rate,
        audio.channels,
        audio.duration()
    );

    Ok(audio)
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Unrecognized audio format: {}", path.display()))?;
    Ok(probed.format)
}
