//! Data carried through the transcript pipeline.
//!
//! Caption tracks are deserialized straight from the player response, so the
//! field names follow the platform's camelCase JSON.

use serde::{Deserialize, Serialize};

/// Whether a caption track was authored by a person or produced by speech
/// recognition. The player response only marks the latter (`"kind": "asr"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "Option<String>")]
pub enum TrackKind {
    #[default]
    Manual,
    Generated,
}

impl From<Option<String>> for TrackKind {
    fn from(kind: Option<String>) -> Self {
        match kind.as_deref() {
            Some("asr") => TrackKind::Generated,
            _ => TrackKind::Manual,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Run {
    text: String,
}

/// Display name of a track. Older responses use `simpleText`, newer ones a
/// list of `runs`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawTrackName")]
pub struct TrackName(pub String);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrackName {
    simple_text: Option<String>,
    #[serde(default)]
    runs: Vec<Run>,
}

impl From<RawTrackName> for TrackName {
    fn from(raw: RawTrackName) -> Self {
        match raw.simple_text {
            Some(text) => TrackName(text),
            None => TrackName(raw.runs.into_iter().map(|r| r.text).collect()),
        }
    }
}

/// One subtitle stream listed in the caption manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
    #[serde(default)]
    pub name: TrackName,
    #[serde(default)]
    pub kind: TrackKind,
    #[serde(default)]
    pub is_translatable: bool,
}

impl CaptionTrack {
    pub fn display_name(&self) -> &str {
        if self.name.0.is_empty() {
            &self.language_code
        } else {
            &self.name.0
        }
    }

    pub fn is_generated(&self) -> bool {
        self.kind == TrackKind::Generated
    }

    /// URL of the plain timed-text XML variant of this track.
    pub fn timedtext_url(&self) -> String {
        self.base_url.replace("&fmt=srv3", "")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptLine {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub video_id: String,
    pub video_title: String,
    pub language: String,
    pub language_code: String,
    pub is_generated: bool,
    pub is_translatable: bool,
    pub lines: Vec<TranscriptLine>,
}

/// Cookie acknowledging the consent interstitial. Lives for one page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

impl ConsentCookie {
    pub fn new(token: &str) -> Self {
        Self {
            name: "CONSENT".to_string(),
            value: format!("YES+{token}"),
            domain: ".youtube.com".to_string(),
        }
    }

    pub fn header_value(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// What a watch page says about the video, judged from its body alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoPageState {
    Ok,
    ConsentRequired,
    TooManyRequests,
    VideoUnavailable,
    NoCaptionData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_absent_is_manual_and_asr_is_generated() {
        let manual: CaptionTrack = serde_json::from_str(
            r#"{"baseUrl":"http://x/a","languageCode":"en","name":{"simpleText":"English"}}"#,
        )
        .unwrap();
        assert!(!manual.is_generated());
        assert!(!manual.is_translatable);

        let asr: CaptionTrack = serde_json::from_str(
            r#"{"baseUrl":"http://x/b","languageCode":"en","kind":"asr","isTranslatable":true}"#,
        )
        .unwrap();
        assert!(asr.is_generated());
        assert!(asr.is_translatable);
        assert_eq!(asr.display_name(), "en");
    }

    #[test]
    fn other_kinds_count_as_manual() {
        let track: CaptionTrack = serde_json::from_str(
            r#"{"baseUrl":"http://x/a","languageCode":"de","kind":"forced"}"#,
        )
        .unwrap();
        assert_eq!(track.kind, TrackKind::Manual);
    }

    #[test]
    fn name_from_runs() {
        let track: CaptionTrack = serde_json::from_str(
            r#"{"baseUrl":"u","languageCode":"es","name":{"runs":[{"text":"Spanish"},{"text":" (auto)"}]}}"#,
        )
        .unwrap();
        assert_eq!(track.display_name(), "Spanish (auto)");
    }

    #[test]
    fn timedtext_url_drops_srv3() {
        let track: CaptionTrack = serde_json::from_str(
            r#"{"baseUrl":"https://www.youtube.com/api/timedtext?v=abc&lang=en&fmt=srv3","languageCode":"en"}"#,
        )
        .unwrap();
        assert_eq!(track.timedtext_url(), "https://www.youtube.com/api/timedtext?v=abc&lang=en");
    }

    #[test]
    fn consent_cookie_header() {
        let cookie = ConsentCookie::new("cb.20210328-17-p0.en+FX+123");
        assert_eq!(cookie.header_value(), "CONSENT=YES+cb.20210328-17-p0.en+FX+123");
        assert_eq!(cookie.domain, ".youtube.com");
    }
}
