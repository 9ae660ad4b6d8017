//! Retrieves caption tracks of YouTube videos and normalizes them into
//! timed transcript lines.
//!
//! ```no_run
//! use yt_transcript::TranscriptApi;
//!
//! let api = TranscriptApi::builder().build()?;
//! let transcripts = api.get_transcripts("https://www.youtube.com/watch?v=dQw4w9WgXcQ", &["en"], false)?;
//! for line in &transcripts[0].lines {
//!     println!("{:>8.2} {}", line.start, line.text);
//! }
//! # Ok::<(), yt_transcript::TranscriptError>(())
//! ```

pub mod config;
pub mod error;
pub mod fetcher;
pub mod format;
pub mod models;
pub mod parser;
pub mod processor;
pub mod subtitle;

use std::sync::Arc;

use tracing::debug;

pub use config::{Config, FailurePolicy, FetchConfig};
pub use error::{Result, TranscriptError};
pub use fetcher::{Deadline, HttpFetcher, PageFetcher, TrackFetcher};
pub use format::{Formatter, JsonFormatter, TextFormatter};
pub use models::{CaptionTrack, Transcript, TranscriptLine};
pub use subtitle::{VideoMetadata, sanitize_video_id};

use fetcher::{ConsentWall, fetch_video_page};
use parser::CaptionParser;
use processor::TrackProcessor;
use subtitle::{MetadataExtractor, select_tracks};

/// The transcript pipeline: watch page, caption manifest, track selection
/// and concurrent retrieval.
pub struct TranscriptApi {
    page_fetcher: Arc<dyn PageFetcher>,
    consent: ConsentWall,
    extractor: MetadataExtractor,
    processor: TrackProcessor,
    config: Config,
}

#[derive(Default)]
pub struct TranscriptApiBuilder {
    page_fetcher: Option<Arc<dyn PageFetcher>>,
    track_fetcher: Option<Arc<dyn TrackFetcher>>,
    fetch_config: Option<FetchConfig>,
    config: Option<Config>,
}

impl TranscriptApiBuilder {
    pub fn page_fetcher(mut self, fetcher: impl PageFetcher + 'static) -> Self {
        self.page_fetcher = Some(Arc::new(fetcher));
        self
    }

    pub fn track_fetcher(mut self, fetcher: impl TrackFetcher + 'static) -> Self {
        self.track_fetcher = Some(Arc::new(fetcher));
        self
    }

    /// One fetcher serving pages, the player API and tracks.
    pub fn fetcher<F: PageFetcher + TrackFetcher + 'static>(mut self, fetcher: F) -> Self {
        let fetcher = Arc::new(fetcher);
        self.page_fetcher = Some(fetcher.clone());
        self.track_fetcher = Some(fetcher);
        self
    }

    /// Settings for the default [`HttpFetcher`]; ignored for injected ones.
    pub fn fetch_config(mut self, config: FetchConfig) -> Self {
        self.fetch_config = Some(config);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<TranscriptApi> {
        let http = Arc::new(HttpFetcher::new(self.fetch_config.unwrap_or_default()));
        let page_fetcher: Arc<dyn PageFetcher> = match self.page_fetcher {
            Some(fetcher) => fetcher,
            None => http.clone(),
        };
        let track_fetcher: Arc<dyn TrackFetcher> = match self.track_fetcher {
            Some(fetcher) => fetcher,
            None => http,
        };
        let config = self.config.unwrap_or_default();

        Ok(TranscriptApi {
            page_fetcher,
            consent: ConsentWall::new()?,
            extractor: MetadataExtractor::new()?,
            processor: TrackProcessor::new(track_fetcher, CaptionParser::new()?, config.policy),
            config,
        })
    }
}

impl TranscriptApi {
    pub fn builder() -> TranscriptApiBuilder {
        TranscriptApiBuilder::default()
    }

    /// Title and available caption tracks of a video, without downloading
    /// any of them.
    pub fn list_tracks(&self, video: &str) -> Result<VideoMetadata> {
        let video_id = sanitize_video_id(video);
        let deadline = Deadline::from_timeout(self.config.timeout);
        self.metadata(&video_id, &deadline)
    }

    /// Transcripts of `video` for `languages` (all tracks if empty). Order
    /// follows completion, not request order.
    pub fn get_transcripts<S: AsRef<str>>(
        &self,
        video: &str,
        languages: &[S],
        preserve_formatting: bool,
    ) -> Result<Vec<Transcript>> {
        let video_id = sanitize_video_id(video);
        let deadline = Deadline::from_timeout(self.config.timeout);

        let metadata = self.metadata(&video_id, &deadline)?;
        let selected = select_tracks(languages, &metadata.tracks)?;
        debug!(video_id, selected = selected.len(), "tracks selected");

        let transcripts = self.processor.process(
            &video_id,
            &metadata.title,
            selected,
            preserve_formatting,
            &deadline,
        )?;
        if transcripts.is_empty() {
            return Err(TranscriptError::NoTranscripts);
        }
        Ok(transcripts)
    }

    /// Runs [`Self::get_transcripts`] and renders the result, sorted by
    /// language code.
    pub fn get_formatted<S: AsRef<str>>(
        &self,
        video: &str,
        languages: &[S],
        preserve_formatting: bool,
        formatter: &dyn Formatter,
    ) -> Result<String> {
        let mut transcripts = self.get_transcripts(video, languages, preserve_formatting)?;
        transcripts.sort_by(|a, b| a.language_code.cmp(&b.language_code));
        formatter.format(&transcripts)
    }

    fn metadata(&self, video_id: &str, deadline: &Deadline) -> Result<VideoMetadata> {
        debug!(video_id, "fetching watch page");
        let body = fetch_video_page(self.page_fetcher.as_ref(), &self.consent, video_id, deadline)
            .and_then(|body| {
                self.extractor
                    .extract(&body, video_id, self.page_fetcher.as_ref(), deadline)
            });
        match body {
            Err(_) if deadline.is_cancelled() => Err(TranscriptError::DeadlineExceeded),
            other => other,
        }
    }
}
