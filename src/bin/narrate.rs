use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;

use narrate_rs::engines::{command::CommandRecognizer, espeak::EspeakSynthesizer};
use narrate_rs::pipeline::Narrator;
use narrate_rs::store::LocalStore;
use narrate_rs::{Document, NarrationConfig};

/// Narrate a document and store the audio with a text-aligned transcript.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Document to narrate (.txt, .md or .docx)
    input: PathBuf,

    /// Directory the narration is stored under, as items/<id>/
    #[arg(long)]
    out: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// espeak-ng voice, overriding the configuration
    #[arg(long)]
    voice: Option<String>,

    /// Speech speed multiplier, overriding the configuration
    #[arg(long)]
    speed: Option<f32>,

    /// Title stored in the manifest; defaults to the file name
    #[arg(long)]
    title: Option<String>,

    /// Speech recognizer program printing a verbose JSON transcript
    #[arg(long)]
    recognizer: PathBuf,

    /// Argument for the recognizer; `{input}` is replaced by the WAV path
    #[arg(long = "recognizer-arg", allow_hyphen_values = true)]
    recognizer_args: Vec<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => NarrationConfig::load(path)?,
        None => NarrationConfig::default(),
    };
    if let Some(voice) = args.voice {
        config.voice = voice;
    }
    if let Some(speed) = args.speed {
        config.speed = speed;
    }

    let filename = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.input.display().to_string());
    let bytes = std::fs::read(&args.input)?;
    let document = Document::from_upload(&filename, &bytes, config.max_document_bytes)?;
    let document = match args.title {
        Some(title) => Document::new(title, document.text()),
        None => document,
    };

    let timeout = config.engine_timeout();
    let synthesizer = EspeakSynthesizer::new().with_timeout(timeout);
    let recognizer = CommandRecognizer::new(args.recognizer)
        .args(args.recognizer_args)
        .with_timeout(timeout);
    let narrator =
        Narrator::new(Box::new(synthesizer), Box::new(recognizer)).with_config(config);

    let start = Instant::now();
    let narration = narrator.narrate(&document)?;
    narration.persist(&LocalStore::new(&args.out))?;

    let manifest = narration.manifest();
    println!(
        "Narrated {:.1}s of audio in {:.2?}",
        manifest.total_duration_secs(),
        start.elapsed()
    );
    println!(
        "Aligned {}/{} segments (mean score {})",
        manifest.alignment.aligned_segments,
        manifest.alignment.total_segments,
        manifest
            .alignment
            .mean_score
            .map_or_else(|| "n/a".to_string(), |s| format!("{s:.1}"))
    );
    println!("Saved to {}", args.out.join("items").join(narration.id()).display());
    println!("{}", narration.id());
    Ok(())
}
