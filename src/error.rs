use thiserror::Error;

/// Failures talking to the platform over HTTP.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] minreq::Error),

    #[error("received non-OK status code: {status}")]
    Status { status: i32 },

    #[error("empty response body")]
    EmptyBody,

    #[error("failed to fetch {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },

    #[error("request cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum ConsentError {
    #[error("failed to find consent value in page")]
    TokenNotFound,

    #[error("consent wall still present after sending the consent cookie")]
    Rejected,

    #[error("failed to fetch page for consent value: {0}")]
    Fetch(#[source] FetchError),
}

/// Definitive states reported by the watch page or the player API. Never
/// retried.
#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("too many requests, the platform answered with a captcha")]
    TooManyRequests,

    #[error("video unavailable: {reason}")]
    VideoUnavailable { reason: String },

    #[error("no caption data for this video")]
    NoCaptionData,

    #[error("caption manifest missing: {0}")]
    ManifestMissing(String),
}

#[derive(Error, Debug)]
#[error("no transcript found for languages {requested:?}")]
pub struct NotFoundError {
    pub requested: Vec<String>,
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed caption XML: {0}")]
    Malformed(#[from] roxmltree::Error),

    #[error("expected <transcript> root element, found <{0}>")]
    UnexpectedRoot(String),
}

/// Top-level error returned by the pipeline; the variant names the stage.
#[derive(Error, Debug)]
pub enum TranscriptError {
    #[error("failed to fetch video page: {0}")]
    Page(#[source] FetchError),

    #[error("consent wall: {0}")]
    Consent(#[from] ConsentError),

    #[error("failed to extract list of transcripts: {0}")]
    Classification(#[from] ClassificationError),

    #[error("failed to query player API: {0}")]
    PlayerApi(#[source] FetchError),

    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    #[error("failed to fetch track {language_code}: {source}")]
    Track {
        language_code: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to parse track {language_code}: {source}")]
    Parse {
        language_code: String,
        #[source]
        source: ParseError,
    },

    #[error("deadline exceeded before all tracks were retrieved")]
    DeadlineExceeded,

    #[error("no transcripts retrieved")]
    NoTranscripts,

    #[error("failed to format transcripts: {0}")]
    Format(String),

    #[error("invalid page pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, TranscriptError>;
