//! Rendering transcripts as text or JSON.

use std::fmt::Write;

use serde::Serialize;

use crate::error::{Result, TranscriptError};
use crate::models::{Transcript, TranscriptLine};

pub trait Formatter: Send + Sync {
    fn format(&self, transcripts: &[Transcript]) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct JsonFormatter {
    pub pretty: bool,
    pub include_timestamps: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self {
            pretty: true,
            include_timestamps: true,
        }
    }
}

#[derive(Serialize)]
struct JsonTranscript<'a> {
    video_id: &'a str,
    video_title: &'a str,
    language: &'a str,
    language_code: &'a str,
    is_generated: bool,
    is_translatable: bool,
    lines: Vec<JsonLine<'a>>,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
}

impl JsonFormatter {
    fn line<'a>(&self, line: &'a TranscriptLine) -> JsonLine<'a> {
        JsonLine {
            text: &line.text,
            start: self.include_timestamps.then_some(line.start),
            duration: self.include_timestamps.then_some(line.duration),
        }
    }
}

impl Formatter for JsonFormatter {
    fn format(&self, transcripts: &[Transcript]) -> Result<String> {
        let out: Vec<JsonTranscript> = transcripts
            .iter()
            .map(|t| JsonTranscript {
                video_id: &t.video_id,
                video_title: &t.video_title,
                language: &t.language,
                language_code: &t.language_code,
                is_generated: t.is_generated,
                is_translatable: t.is_translatable,
                lines: t.lines.iter().map(|l| self.line(l)).collect(),
            })
            .collect();

        let rendered = if self.pretty {
            serde_json::to_string_pretty(&out)
        } else {
            serde_json::to_string(&out)
        };
        rendered.map_err(|e| TranscriptError::Format(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct TextFormatter {
    pub include_timestamps: bool,
    pub include_language_code: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            include_timestamps: true,
            include_language_code: true,
        }
    }
}

impl Formatter for TextFormatter {
    fn format(&self, transcripts: &[Transcript]) -> Result<String> {
        let mut text = String::new();
        for transcript in transcripts {
            write_transcript(&mut text, transcript, self)
                .map_err(|e| TranscriptError::Format(e.to_string()))?;
        }
        Ok(text)
    }
}

fn write_transcript(out: &mut String, transcript: &Transcript, opts: &TextFormatter) -> std::fmt::Result {
    if opts.include_language_code {
        writeln!(out, "Language: {} ({})", transcript.language, transcript.language_code)?;
    } else {
        writeln!(out, "Language: {}", transcript.language)?;
    }
    for line in &transcript.lines {
        if opts.include_timestamps {
            writeln!(out, "{:.6}: {}", line.start, line.text)?;
        } else {
            writeln!(out, "{}", line.text)?;
        }
    }
    Ok(())
}
