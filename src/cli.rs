use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per note
    Table,
    /// Notes as JSON
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "notescribe", about = "Transcribe a recorded melody into timed notes")]
pub struct Cli {
    /// Input audio files (WAV, MP3, FLAC, OGG)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Write the transcription to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Fixed tempo in beats per minute (estimated from the audio when omitted)
    #[arg(long)]
    pub bpm: Option<u32>,

    /// Drop notes shorter than this many seconds
    #[arg(long, default_value_t = 0.03)]
    pub min_duration: f32,

    /// Directory for log-compressed constant-Q band spectrograms (JSON, one per input)
    #[arg(long)]
    pub bands: Option<PathBuf>,

    /// Log-compression gain for the band spectrogram (0-20]
    #[arg(long, default_value_t = 1.0)]
    pub lambda: f32,

    /// Config file (defaults to ./notescribe.toml, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
