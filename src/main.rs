mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use cli::{Cli, OutputFormat};
use notescribe::audio::decode::decode_audio;
use notescribe::config::{self, Config};
use notescribe::Note;

#[derive(Serialize)]
struct FileReport {
    file: String,
    bpm: u32,
    notes: Vec<Note>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    let pb = if cli.inputs.len() > 1 {
        let pb = ProgressBar::new(cli.inputs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files {msg}")
                .context("Invalid progress bar template")?
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut reports = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        if let Some(ref pb) = pb {
            pb.set_message(input.display().to_string());
        }
        reports.push(process_file(input, &cli, &config)?);
        if let Some(ref pb) = pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = pb {
        pb.finish_with_message("done");
    }

    let rendered = match cli.format {
        OutputFormat::Json => {
            let mut json = if reports.len() == 1 {
                serde_json::to_string_pretty(&reports[0])?
            } else {
                serde_json::to_string_pretty(&reports)?
            };
            json.push('\n');
            json
        }
        OutputFormat::Table => render_table(&reports),
    };

    match cli.output {
        Some(ref path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote {}", path.display());
        }
        None => {
            std::io::stdout()
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }

    Ok(())
}

/// Load the config file (explicit path, ./notescribe.toml, or the user config
/// dir) and let CLI flags that differ from their defaults override it.
fn resolve_config(cli: &Cli) -> Result<Config> {
    let config_path = cli.config.clone().or_else(|| {
        let local = PathBuf::from("notescribe.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("notescribe").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("notescribe").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });

    let mut cfg = match config_path {
        Some(ref path) => match config::load_config(path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };

    if cli.bpm.is_some() {
        cfg.tempo.bpm = cli.bpm;
    }
    if cli.min_duration != 0.03 {
        cfg.analysis.min_note_duration = cli.min_duration;
    }
    if cli.lambda != 1.0 {
        cfg.filterbank.lambda = cli.lambda;
    }

    cfg.validate().context("Invalid configuration")?;
    Ok(cfg)
}

fn process_file(input: &Path, cli: &Cli, config: &Config) -> Result<FileReport> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    log::info!("Input: {}", input.display());

    let audio = decode_audio(input)?;
    let result = notescribe::transcribe(&audio.samples, audio.sample_rate, audio.channels, config)
        .with_context(|| format!("Failed to transcribe {}", input.display()))?;

    if let Some(ref dir) = cli.bands {
        let bands = notescribe::band_spectrogram(
            &audio.samples,
            audio.sample_rate,
            audio.channels,
            &config.filterbank,
            config.analysis.hop_size,
        )
        .with_context(|| format!("Failed to build band spectrogram for {}", input.display()))?;

        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audio");
        let path = dir.join(format!("{}.bands.json", stem));
        std::fs::write(&path, serde_json::to_vec(&bands)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Band spectrogram: {} frames -> {}", bands.len(), path.display());
    }

    Ok(FileReport {
        file: input.display().to_string(),
        bpm: result.bpm,
        notes: result.notes,
    })
}

fn render_table(reports: &[FileReport]) -> String {
    let mut out = String::new();
    for report in reports {
        out.push_str(&format!("{} ({} BPM, {} notes)\n", report.file, report.bpm, report.notes.len()));
        for note in &report.notes {
            out.push_str(&format!(
                "  {:>8.3}s - {:>8.3}s  {:<5} {}\n",
                note.start_time, note.end_time, note.pitch, note.note_type
            ));
        }
    }
    out
}
