use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::document::{format_timestamp, parse_timestamp, SubtitleDocument, SubtitleEntry};
use crate::error::{Result, SubflowError};

/// On-disk subtitle representations handled by the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum SubtitleFormat {
    /// Plain timed text
    Srt,
    /// Styled subtitles, accepts an optional style payload on save
    Ass,
    /// Lossless entry dump
    Json,
}

impl SubtitleFormat {
    pub fn from_extension(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_lowercase();
        match extension.as_str() {
            "srt" => Ok(SubtitleFormat::Srt),
            "ass" => Ok(SubtitleFormat::Ass),
            "json" => Ok(SubtitleFormat::Json),
            other => Err(SubflowError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SubtitleFormat::Srt => "srt",
            SubtitleFormat::Ass => "ass",
            SubtitleFormat::Json => "json",
        }
    }
}

/// How original and translated text are arranged in the exported file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum LayoutMode {
    TranslatedOnTop,
    OriginalOnTop,
    TranslatedOnly,
    OriginalOnly,
}

impl LayoutMode {
    fn lines<'a>(self, entry: &'a SubtitleEntry) -> Vec<&'a str> {
        let ordered: [&str; 2] = match self {
            LayoutMode::TranslatedOnTop => [&entry.translated_text, &entry.original_text],
            LayoutMode::OriginalOnTop => [&entry.original_text, &entry.translated_text],
            LayoutMode::TranslatedOnly => [&entry.translated_text, ""],
            LayoutMode::OriginalOnly => [&entry.original_text, ""],
        };
        ordered.into_iter().filter(|line| !line.is_empty()).collect()
    }
}

/// Loads and saves subtitle documents. Exact byte layout is a codec
/// concern; load/save round-trips preserve entry semantics.
#[async_trait]
pub trait DocumentCodec: Send + Sync {
    async fn load(&self, path: &Path) -> Result<SubtitleDocument>;

    async fn save(
        &self,
        document: &SubtitleDocument,
        path: &Path,
        format: SubtitleFormat,
        layout: LayoutMode,
        style: Option<&str>,
    ) -> Result<()>;
}

/// File-based codec for the supported formats
pub struct FileCodec;

#[async_trait]
impl DocumentCodec for FileCodec {
    async fn load(&self, path: &Path) -> Result<SubtitleDocument> {
        if !path.is_file() {
            return Err(SubflowError::FileNotFound(path.display().to_string()));
        }
        let format = SubtitleFormat::from_extension(path)?;
        let content = fs::read_to_string(path).await?;
        let entries = match format {
            SubtitleFormat::Srt => parse_srt(&content)?,
            SubtitleFormat::Ass => parse_ass(&content)?,
            SubtitleFormat::Json => serde_json::from_str(&content)?,
        };
        info!(
            "Loaded {} subtitle entries from {}",
            entries.len(),
            path.display()
        );
        Ok(SubtitleDocument::from_entries(entries))
    }

    async fn save(
        &self,
        document: &SubtitleDocument,
        path: &Path,
        format: SubtitleFormat,
        layout: LayoutMode,
        style: Option<&str>,
    ) -> Result<()> {
        let content = match format {
            SubtitleFormat::Srt => generate_srt(document, layout),
            SubtitleFormat::Ass => generate_ass(document, layout, style),
            SubtitleFormat::Json => {
                let entries: Vec<&SubtitleEntry> = document.entries().values().collect();
                serde_json::to_string_pretty(&entries)?
            }
        };
        fs::write(path, content).await?;
        info!("Saved {} subtitle file: {}", format.extension(), path.display());
        Ok(())
    }
}

fn generate_srt(document: &SubtitleDocument, layout: LayoutMode) -> String {
    let mut content = String::new();
    for (index, entry) in document.entries().values().enumerate() {
        content.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            format_srt_time(entry.start_time),
            format_srt_time(entry.end_time),
            layout.lines(entry).join("\n")
        ));
    }
    content
}

fn parse_srt(content: &str) -> Result<Vec<SubtitleEntry>> {
    let mut entries = Vec::new();
    for block in content.split("\n\n") {
        let mut lines = block.lines().filter(|line| !line.trim().is_empty());
        // Index line, then the time range line
        let Some(_index) = lines.next() else { continue };
        let time_line = lines
            .next()
            .ok_or_else(|| SubflowError::MalformedTimestamp(block.trim().to_string()))?;
        let (start, end) = time_line
            .split_once("-->")
            .ok_or_else(|| SubflowError::MalformedTimestamp(time_line.to_string()))?;

        let text: Vec<&str> = lines.collect();
        entries.push(SubtitleEntry::new(
            parse_timestamp(start)?,
            parse_timestamp(end)?,
            text.join("\n"),
            "",
        ));
    }
    Ok(entries)
}

fn generate_ass(document: &SubtitleDocument, layout: LayoutMode, style: Option<&str>) -> String {
    let default_style = concat!(
        "[V4+ Styles]\n",
        "Format: Name, Fontname, Fontsize, PrimaryColour, Bold, Alignment\n",
        "Style: Default,Arial,20,&H00FFFFFF,0,2\n",
    );

    let mut content = String::from("[Script Info]\nScriptType: v4.00+\nWrapStyle: 0\n\n");
    content.push_str(style.unwrap_or(default_style));
    content.push_str(
        "\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n",
    );
    for entry in document.entries().values() {
        content.push_str(&format!(
            "Dialogue: 0,{},{},Default,,0,0,0,,{}\n",
            format_ass_time(entry.start_time),
            format_ass_time(entry.end_time),
            layout.lines(entry).join("\\N")
        ));
    }
    content
}

fn parse_ass(content: &str) -> Result<Vec<SubtitleEntry>> {
    let mut entries = Vec::new();
    for line in content.lines() {
        let Some(rest) = line.strip_prefix("Dialogue:") else {
            continue;
        };
        let fields: Vec<&str> = rest.splitn(10, ',').collect();
        if fields.len() < 10 {
            return Err(SubflowError::UnsupportedFormat(format!(
                "truncated dialogue line: {line}"
            )));
        }
        let start = parse_ass_time(fields[1].trim())?;
        let end = parse_ass_time(fields[2].trim())?;
        let (original, translated) = match fields[9].split_once("\\N") {
            Some((first, second)) => (first.to_string(), second.to_string()),
            None => (fields[9].to_string(), String::new()),
        };
        entries.push(SubtitleEntry::new(start, end, original, translated));
    }
    Ok(entries)
}

/// SRT time format (HH:MM:SS,mmm)
fn format_srt_time(milliseconds: u64) -> String {
    format_timestamp(milliseconds).replace('.', ",")
}

/// ASS time format (H:MM:SS.cc)
fn format_ass_time(milliseconds: u64) -> String {
    let hours = milliseconds / 3_600_000;
    let minutes = (milliseconds % 3_600_000) / 60_000;
    let seconds = (milliseconds % 60_000) / 1_000;
    let centis = (milliseconds % 1_000) / 10;

    format!("{}:{:02}:{:02}.{:02}", hours, minutes, seconds, centis)
}

fn parse_ass_time(value: &str) -> Result<u64> {
    let malformed = || SubflowError::MalformedTimestamp(value.to_string());
    let mut clock = value.splitn(3, ':');
    let hours: u64 = clock
        .next()
        .and_then(|part| part.parse().ok())
        .ok_or_else(malformed)?;
    let minutes: u64 = clock
        .next()
        .and_then(|part| part.parse().ok())
        .ok_or_else(malformed)?;
    let rest = clock.next().ok_or_else(malformed)?;
    let (seconds, centis) = rest.split_once('.').ok_or_else(malformed)?;
    let seconds: u64 = seconds.parse().map_err(|_| malformed())?;
    let centis: u64 = centis.parse().map_err(|_| malformed())?;

    Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + centis * 10)
}
