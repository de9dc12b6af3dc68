use crate::audio::WavFormat;

/// Error type returned by engine implementations.
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum NarrationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "docx")]
    #[error("Failed to read .docx archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[cfg(feature = "pdf")]
    #[error("Failed to read .pdf: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("Unsupported file type '{0}'. Use .txt, .md, .docx or .pdf.")]
    UnsupportedFormat(String),
    #[error("Document is {size} bytes, the limit is {limit} bytes")]
    DocumentTooLarge { size: usize, limit: usize },
    #[error("No text extracted from the document")]
    EmptyDocument,
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("{stage} failed for chunk {chunk}: {source}")]
    Engine {
        stage: &'static str,
        chunk: usize,
        #[source]
        source: EngineError,
    },
    #[error(
        "Chunk {chunk} audio format {found} does not match the first chunk ({expected}). \
         Re-encode chunks to a common format before stitching."
    )]
    AudioFormatMismatch {
        chunk: usize,
        expected: WavFormat,
        found: WavFormat,
    },
    #[error("No audio chunks to stitch")]
    NoAudio,
    #[error("Invalid transcript: {0}")]
    Transcript(String),
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),
    #[error("Inconsistent manifest: {0}")]
    InconsistentManifest(String),
    #[error("Artifact not found: {0}")]
    NotFound(String),
    #[error("Narration cancelled")]
    Cancelled,
}

impl NarrationError {
    pub(crate) fn engine(stage: &'static str, chunk: usize, source: EngineError) -> Self {
        Self::Engine {
            stage,
            chunk,
            source,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
