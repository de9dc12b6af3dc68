//! WAV handling for chunk audio: inspection, stitching and the final
//! compressed encode.

use std::fmt;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::error::NarrationError;

/// The parameters that must agree for two WAV streams to be concatenated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_format: hound::SampleFormat,
    pub sample_rate: u32,
}

impl From<hound::WavSpec> for WavFormat {
    fn from(spec: hound::WavSpec) -> Self {
        Self {
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            sample_format: spec.sample_format,
            sample_rate: spec.sample_rate,
        }
    }
}

impl From<WavFormat> for hound::WavSpec {
    fn from(format: WavFormat) -> Self {
        hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.bits_per_sample,
            sample_format: format.sample_format,
        }
    }
}

impl fmt::Display for WavFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.sample_format {
            hound::SampleFormat::Int => "int",
            hound::SampleFormat::Float => "float",
        };
        write!(
            f,
            "channels={} bits={} ({}) rate={}Hz",
            self.channels, self.bits_per_sample, kind, self.sample_rate
        )
    }
}

/// Read the format of an in-memory WAV file.
pub fn wav_format(wav: &[u8]) -> Result<WavFormat, NarrationError> {
    let reader = hound::WavReader::new(Cursor::new(wav))?;
    Ok(reader.spec().into())
}

/// Duration of an in-memory WAV file in seconds.
pub fn wav_duration_secs(wav: &[u8]) -> Result<f64, NarrationError> {
    let reader = hound::WavReader::new(Cursor::new(wav))?;
    let rate = reader.spec().sample_rate;
    if rate == 0 {
        return Ok(0.0);
    }
    Ok(reader.duration() as f64 / rate as f64)
}

/// Encode mono f32 samples as a 32-bit float WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, NarrationError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut out = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut out, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(out.into_inner())
}

/// Concatenate chunk WAVs, in order, into one WAV file.
///
/// Every chunk must have the format of the first one; a mismatch is an
/// error rather than a silent resample.
pub fn concat_wavs<B: AsRef<[u8]>>(chunks: &[B]) -> Result<Vec<u8>, NarrationError> {
    let readers = chunks
        .iter()
        .map(|chunk| hound::WavReader::new(Cursor::new(chunk.as_ref())))
        .collect::<Result<Vec<_>, _>>()?;

    let first = readers.first().ok_or(NarrationError::NoAudio)?;
    let expected = WavFormat::from(first.spec());
    for (chunk, reader) in readers.iter().enumerate().skip(1) {
        let found = WavFormat::from(reader.spec());
        if found != expected {
            return Err(NarrationError::AudioFormatMismatch {
                chunk,
                expected,
                found,
            });
        }
    }

    let mut out = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut out, expected.into())?;
        for reader in readers {
            match expected.sample_format {
                hound::SampleFormat::Float => {
                    for sample in reader.into_samples::<f32>() {
                        writer.write_sample(sample?)?;
                    }
                }
                hound::SampleFormat::Int => {
                    for sample in reader.into_samples::<i32>() {
                        writer.write_sample(sample?)?;
                    }
                }
            }
        }
        writer.finalize()?;
    }

    log::debug!("Concatenated {} chunk WAVs ({expected})", chunks.len());
    Ok(out.into_inner())
}

/// Container format of the stored narration audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedAudio {
    pub format: AudioFormat,
    pub bytes: Vec<u8>,
}

/// Outcome of a compressed encode attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoding {
    Encoded(EncodedAudio),
    /// The encoder could not produce output; the reason is kept for logs.
    Unavailable(String),
}

/// Compresses the stitched WAV for storage.
pub trait AudioEncoder: Send + Sync {
    fn encode(&self, wav: &[u8]) -> Encoding;
}

/// Never compresses; narrations are stored as WAV.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavOnlyEncoder;

impl AudioEncoder for WavOnlyEncoder {
    fn encode(&self, _wav: &[u8]) -> Encoding {
        Encoding::Unavailable("compression disabled".to_string())
    }
}

/// MP3 encoding through an `ffmpeg` subprocess.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    /// ffmpeg binary; `None` uses `ffmpeg` from PATH.
    pub bin_path: Option<PathBuf>,
    pub bitrate_kbps: u32,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self {
            bin_path: None,
            bitrate_kbps: 64,
        }
    }
}

impl FfmpegEncoder {
    pub fn new(bitrate_kbps: u32) -> Self {
        Self {
            bitrate_kbps,
            ..Default::default()
        }
    }

    fn run(&self, wav: &[u8]) -> Result<Vec<u8>, String> {
        let bin = self
            .bin_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));
        let bitrate = format!("{}k", self.bitrate_kbps);

        let mut child = Command::new(&bin)
            .args(["-hide_banner", "-loglevel", "error", "-f", "wav", "-i", "pipe:0"])
            .args(["-vn", "-b:a", bitrate.as_str(), "-f", "mp3", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    format!("{} not found", bin.display())
                } else {
                    format!("failed to start {}: {e}", bin.display())
                }
            })?;

        // Feed stdin from its own thread so a full stdout pipe cannot stall us.
        let stdin = child.stdin.take();
        let input = wav.to_vec();
        let feeder = std::thread::spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(&input),
            None => Ok(()),
        });

        let output = child
            .wait_with_output()
            .map_err(|e| format!("ffmpeg did not finish: {e}"))?;
        let fed = feeder
            .join()
            .map_err(|_| "ffmpeg stdin writer panicked".to_string())?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "ffmpeg exited with code {:?}: {}",
                output.status.code(),
                stderr.chars().take(600).collect::<String>()
            ));
        }
        fed.map_err(|e| format!("failed to write WAV to ffmpeg: {e}"))?;
        if output.stdout.is_empty() {
            return Err("ffmpeg produced no output".to_string());
        }
        Ok(output.stdout)
    }
}

impl AudioEncoder for FfmpegEncoder {
    fn encode(&self, wav: &[u8]) -> Encoding {
        match self.run(wav) {
            Ok(bytes) => Encoding::Encoded(EncodedAudio {
                format: AudioFormat::Mp3,
                bytes,
            }),
            Err(reason) => Encoding::Unavailable(reason),
        }
    }
}
