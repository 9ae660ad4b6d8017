//! Fan-out of track downloads, one worker thread per selected track.
//!
//! Workers report through a bounded channel sized to the number of tracks,
//! so no worker ever blocks on send. The channel disconnects once every
//! worker has dropped its sender. Output order follows completion order.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{RecvTimeoutError, bounded};
use tracing::{debug, warn};

use crate::config::FailurePolicy;
use crate::error::{Result, TranscriptError};
use crate::fetcher::{Deadline, TrackFetcher};
use crate::models::{CaptionTrack, Transcript};
use crate::parser::CaptionParser;

pub struct TrackProcessor {
    fetcher: Arc<dyn TrackFetcher>,
    parser: CaptionParser,
    policy: FailurePolicy,
}

impl TrackProcessor {
    pub fn new(fetcher: Arc<dyn TrackFetcher>, parser: CaptionParser, policy: FailurePolicy) -> Self {
        Self {
            fetcher,
            parser,
            policy,
        }
    }

    /// Downloads and parses every track concurrently.
    ///
    /// Under [`FailurePolicy::FailFast`] the first failed track cancels the
    /// others and its error is returned; under
    /// [`FailurePolicy::BestEffort`] failures are logged and skipped. When
    /// the deadline passes, outstanding workers are cancelled and
    /// [`TranscriptError::DeadlineExceeded`] is returned.
    pub fn process(
        &self,
        video_id: &str,
        title: &str,
        tracks: Vec<CaptionTrack>,
        preserve_formatting: bool,
        deadline: &Deadline,
    ) -> Result<Vec<Transcript>> {
        if tracks.is_empty() {
            return Ok(Vec::new());
        }

        let total = tracks.len();
        let (scope, canceller) = deadline.child();
        let (sender, receiver) = bounded::<Result<Transcript>>(total);

        for track in tracks {
            let sender = sender.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let parser = self.parser.clone();
            let scope = scope.clone();
            let video_id = video_id.to_string();
            let title = title.to_string();
            thread::spawn(move || {
                let outcome = retrieve(&*fetcher, &parser, &scope, video_id, title, track, preserve_formatting);
                // The receiver is gone if the batch was already abandoned.
                let _ = sender.send(outcome);
            });
        }
        drop(sender);

        let mut transcripts = Vec::with_capacity(total);
        loop {
            let next = match deadline.at() {
                Some(at) => receiver.recv_deadline(at),
                None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match next {
                Ok(Ok(transcript)) => transcripts.push(transcript),
                Ok(Err(_)) if deadline.is_cancelled() => {
                    canceller.cancel();
                    return Err(TranscriptError::DeadlineExceeded);
                }
                Ok(Err(e)) => match self.policy {
                    FailurePolicy::FailFast => {
                        canceller.cancel();
                        return Err(e);
                    }
                    FailurePolicy::BestEffort => warn!(error = %e, "skipping track"),
                },
                Err(RecvTimeoutError::Timeout) => {
                    canceller.cancel();
                    return Err(TranscriptError::DeadlineExceeded);
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        debug!(video_id, retrieved = transcripts.len(), requested = total, "tracks processed");
        Ok(transcripts)
    }
}

fn retrieve(
    fetcher: &dyn TrackFetcher,
    parser: &CaptionParser,
    deadline: &Deadline,
    video_id: String,
    video_title: String,
    track: CaptionTrack,
    preserve_formatting: bool,
) -> Result<Transcript> {
    let body = fetcher
        .fetch_track(&track.timedtext_url(), deadline)
        .map_err(|source| TranscriptError::Track {
            language_code: track.language_code.clone(),
            source,
        })?;
    let lines = parser
        .parse(&body, preserve_formatting)
        .map_err(|source| TranscriptError::Parse {
            language_code: track.language_code.clone(),
            source,
        })?;
    debug!(language_code = %track.language_code, lines = lines.len(), "track parsed");

    Ok(Transcript {
        video_id,
        video_title,
        language: track.display_name().to_string(),
        is_generated: track.is_generated(),
        is_translatable: track.is_translatable,
        language_code: track.language_code,
        lines,
    })
}
