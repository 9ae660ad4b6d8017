//! Watch-page metadata: title, caption manifest and track selection.

use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClassificationError, ConsentError, NotFoundError, Result, TranscriptError};
use crate::fetcher::{ConsentWall, Deadline, PageFetcher};
use crate::models::{CaptionTrack, VideoPageState};

const CAPTCHA_MARKER: &str = r#"class="g-recaptcha""#;
const PLAYABILITY_MARKER: &str = r#""playabilityStatus":"#;
const CAPTIONS_MARKER: &str = r#""captions":"#;
const VIDEO_DETAILS_MARKER: &str = r#","videoDetails"#;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerDataResponse {
    captions: Option<Captions>,
    playability_status: Option<PlayabilityStatus>,
}

#[derive(Deserialize)]
struct PlayabilityStatus {
    status: Option<String>,
    reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Captions {
    player_captions_tracklist_renderer: Option<PlayerCaptionsTracklistRenderer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerCaptionsTracklistRenderer {
    #[serde(default)]
    caption_tracks: Vec<CaptionTrack>,
}

/// Title and caption manifest of one video.
#[derive(Debug, Clone)]
pub struct VideoMetadata {
    pub title: String,
    pub tracks: Vec<CaptionTrack>,
}

/// Reads a watch page. Holds its compiled patterns so they are built once
/// per pipeline.
pub struct MetadataExtractor {
    api_key: Regex,
    consent: ConsentWall,
}

impl MetadataExtractor {
    pub fn new() -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            api_key: Regex::new(r#""INNERTUBE_API_KEY":\s*"([a-zA-Z0-9_-]+)""#)?,
            consent: ConsentWall::new()?,
        })
    }

    pub fn api_key<'a>(&self, body: &'a str) -> Option<&'a str> {
        self.api_key
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Judges the page from its body alone. `Ok` means either an inline
    /// caption manifest or an API key to ask the player endpoint with.
    pub fn classify(&self, body: &str) -> VideoPageState {
        if self.consent.is_present(body) {
            VideoPageState::ConsentRequired
        } else if body.contains(CAPTCHA_MARKER) {
            VideoPageState::TooManyRequests
        } else if self.api_key(body).is_some() || body.contains(CAPTIONS_MARKER) {
            VideoPageState::Ok
        } else if !body.contains(PLAYABILITY_MARKER) {
            VideoPageState::VideoUnavailable
        } else {
            VideoPageState::NoCaptionData
        }
    }

    /// Extracts the title and the caption tracks. Pages carrying an API key
    /// are resolved through the player endpoint, the others through the
    /// manifest embedded in the page.
    pub fn extract(
        &self,
        body: &str,
        video_id: &str,
        fetcher: &dyn PageFetcher,
        deadline: &Deadline,
    ) -> Result<VideoMetadata> {
        match self.classify(body) {
            VideoPageState::Ok => {}
            VideoPageState::ConsentRequired => return Err(ConsentError::Rejected.into()),
            VideoPageState::TooManyRequests => return Err(ClassificationError::TooManyRequests.into()),
            VideoPageState::VideoUnavailable => {
                return Err(ClassificationError::VideoUnavailable {
                    reason: "page carries no playability status".into(),
                }
                .into());
            }
            VideoPageState::NoCaptionData => return Err(ClassificationError::NoCaptionData.into()),
        }

        let title = extract_title(body);
        let tracks = match self.api_key(body) {
            Some(api_key) => {
                debug!(video_id, "resolving captions through the player API");
                let data = fetcher
                    .fetch_player_data(video_id, api_key, deadline)
                    .map_err(TranscriptError::PlayerApi)?;
                tracks_from_player_data(data)?
            }
            None => {
                debug!(video_id, "reading inline caption manifest");
                inline_tracks(body)?
            }
        };

        let tracks: Vec<CaptionTrack> = tracks
            .into_iter()
            .filter(|track| {
                let keep = !track.base_url.is_empty();
                if !keep {
                    warn!(language_code = %track.language_code, "dropping caption track without URL");
                }
                keep
            })
            .collect();
        if tracks.is_empty() {
            return Err(ClassificationError::NoCaptionData.into());
        }

        Ok(VideoMetadata { title, tracks })
    }
}

fn inline_tracks(body: &str) -> std::result::Result<Vec<CaptionTrack>, ClassificationError> {
    let after = body
        .split_once(CAPTIONS_MARKER)
        .map(|(_, rest)| rest)
        .ok_or(ClassificationError::NoCaptionData)?;
    let raw = after
        .split_once(VIDEO_DETAILS_MARKER)
        .map_or(after, |(captions, _)| captions)
        .replace('\n', "");

    let captions: Captions = serde_json::from_str(&raw)
        .map_err(|e| ClassificationError::ManifestMissing(format!("invalid captions JSON: {e}")))?;
    captions
        .player_captions_tracklist_renderer
        .map(|r| r.caption_tracks)
        .ok_or_else(|| ClassificationError::ManifestMissing("playerCaptionsTracklistRenderer not found".into()))
}

fn tracks_from_player_data(
    data: serde_json::Value,
) -> std::result::Result<Vec<CaptionTrack>, ClassificationError> {
    let response: PlayerDataResponse = serde_json::from_value(data)
        .map_err(|e| ClassificationError::ManifestMissing(format!("invalid player response: {e}")))?;

    let renderer = response
        .captions
        .and_then(|c| c.player_captions_tracklist_renderer);
    match (renderer, response.playability_status) {
        (Some(renderer), _) => Ok(renderer.caption_tracks),
        (None, Some(PlayabilityStatus { status: Some(status), reason })) if status != "OK" => {
            Err(ClassificationError::VideoUnavailable {
                reason: reason.unwrap_or(status),
            })
        }
        (None, _) => Err(ClassificationError::NoCaptionData),
    }
}

/// Text of the first `<title>` element in document order, entities decoded.
/// Empty if there is none.
pub fn extract_title(body: &str) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    Html::parse_document(body)
        .select(&selector)
        .next()
        .map(|title| title.text().collect::<String>())
        .unwrap_or_default()
}

/// Tracks matching `languages`, grouped in the caller's language order and
/// in catalog order within a language. An empty request selects everything.
pub fn select_tracks<S: AsRef<str>>(
    languages: &[S],
    tracks: &[CaptionTrack],
) -> std::result::Result<Vec<CaptionTrack>, NotFoundError> {
    if languages.is_empty() {
        return Ok(tracks.to_vec());
    }

    let selected: Vec<CaptionTrack> = languages
        .iter()
        .flat_map(|lang| {
            tracks
                .iter()
                .filter(move |track| track.language_code == lang.as_ref())
        })
        .cloned()
        .collect();

    if selected.is_empty() {
        return Err(NotFoundError {
            requested: languages.iter().map(|l| l.as_ref().to_string()).collect(),
        });
    }
    Ok(selected)
}

/// Turns a watch URL into its `v` parameter; anything else passes through.
pub fn sanitize_video_id(raw: &str) -> String {
    let looks_like_url = ["http://", "https://", "www."]
        .iter()
        .any(|prefix| raw.starts_with(prefix));
    if !looks_like_url {
        return raw.to_string();
    }
    if !raw.contains("youtube.com") {
        warn!(input = raw, "this doesn't look like a youtube video, trying it anyway");
        return raw.to_string();
    }

    let absolute = if raw.starts_with("www.") {
        format!("https://{raw}")
    } else {
        raw.to_string()
    };
    match Url::parse(&absolute) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default(),
        Err(e) => {
            warn!(input = raw, error = %e, "failed to parse video URL");
            String::new()
        }
    }
}
