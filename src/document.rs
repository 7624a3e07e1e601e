use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::error::{Result, SubflowError};

/// A single timed text entry. `end_time > start_time` is the validity
/// condition; edits that break it are kept but reported by `is_valid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleEntry {
    /// Start offset in milliseconds
    pub start_time: u64,
    /// End offset in milliseconds
    pub end_time: u64,
    pub original_text: String,
    pub translated_text: String,
}

impl SubtitleEntry {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        start_time: u64,
        end_time: u64,
        original_text: S1,
        translated_text: S2,
    ) -> Self {
        Self {
            start_time,
            end_time,
            original_text: original_text.into(),
            translated_text: translated_text.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.end_time > self.start_time
    }
}

/// Editable column of a subtitle entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryColumn {
    StartTime,
    EndTime,
    OriginalText,
    TranslatedText,
}

/// Change notifications emitted by the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// Point edits touched the listed keys
    EntriesChanged(Vec<u32>),
    /// The structural shape changed and all keys were re-issued
    EntriesReplaced,
}

/// Ordered collection of subtitle entries keyed by a dense 1..=N sequence.
///
/// Keys convey document order and are re-issued after every structural
/// change (load, merge, bulk replace). Point edits never re-key.
#[derive(Debug, Default)]
pub struct SubtitleDocument {
    entries: BTreeMap<u32, SubtitleEntry>,
    events: Option<UnboundedSender<DocumentEvent>>,
}

impl SubtitleDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<SubtitleEntry>) -> Self {
        let mut document = Self::new();
        document.entries = Self::reindex(entries);
        document
    }

    /// Route change notifications to the given channel. At most one sink;
    /// the document is owned by a single consumer at a time.
    pub fn set_event_sink(&mut self, sink: UnboundedSender<DocumentEvent>) {
        self.events = Some(sink);
    }

    pub fn entries(&self) -> &BTreeMap<u32, SubtitleEntry> {
        &self.entries
    }

    pub fn get(&self, key: u32) -> Option<&SubtitleEntry> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the whole document, re-issuing keys densely
    pub fn replace_all(&mut self, entries: Vec<SubtitleEntry>) {
        self.entries = Self::reindex(entries);
        self.emit(DocumentEvent::EntriesReplaced);
    }

    /// Apply text updates keyed by entry. A value containing a newline
    /// carries both texts ("original\ntranslated"); otherwise only the
    /// translated text is replaced. Unknown keys are skipped with a warning.
    pub fn apply_updates(&mut self, updates: &BTreeMap<u32, String>) {
        let mut changed = Vec::new();
        for (key, value) in updates {
            let Some(entry) = self.entries.get_mut(key) else {
                warn!("Skipping update for unknown entry key {}", key);
                continue;
            };
            match value.split_once('\n') {
                Some((original, translated)) => {
                    entry.original_text = original.to_string();
                    entry.translated_text = translated.to_string();
                }
                None => entry.translated_text = value.clone(),
            }
            changed.push(*key);
        }
        if !changed.is_empty() {
            self.emit(DocumentEvent::EntriesChanged(changed));
        }
    }

    /// Merge the entries at the given row positions (0-based, document
    /// order) into one entry spanning from the first row's start to the
    /// last row's end, texts space-joined in document order.
    ///
    /// Fewer than 2 distinct in-range rows is a no-op and emits nothing.
    /// Non-contiguous selections are accepted: every selected row is
    /// removed and the merged entry takes the position of the first
    /// selected row. Keys are re-issued densely afterwards.
    pub fn merge_rows(&mut self, rows: &[usize]) -> Result<bool> {
        let mut rows: Vec<usize> = rows
            .iter()
            .copied()
            .filter(|row| *row < self.entries.len())
            .collect();
        rows.sort_unstable();
        rows.dedup();
        if rows.len() < 2 {
            debug!("Merge needs at least two rows, ignoring");
            return Ok(false);
        }

        let ordered: Vec<SubtitleEntry> = self.entries.values().cloned().collect();
        let merged = SubtitleEntry::new(
            ordered[rows[0]].start_time,
            ordered[*rows.last().expect("rows checked non-empty")].end_time,
            rows.iter()
                .map(|row| ordered[*row].original_text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            rows.iter()
                .map(|row| ordered[*row].translated_text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        );

        let mut result = Vec::with_capacity(ordered.len() - rows.len() + 1);
        for (position, entry) in ordered.into_iter().enumerate() {
            if position == rows[0] {
                result.push(merged.clone());
            }
            if !rows.contains(&position) {
                result.push(entry);
            }
        }

        self.entries = Self::reindex(result);
        self.emit(DocumentEvent::EntriesReplaced);
        Ok(true)
    }

    /// Edit one cell of an existing entry. Time columns parse a
    /// fixed-precision `hh:mm:ss.zzz` timestamp; a failed parse rejects the
    /// edit and leaves the entry untouched.
    pub fn set_cell(&mut self, key: u32, column: EntryColumn, value: &str) -> Result<()> {
        if !self.entries.contains_key(&key) {
            return Err(SubflowError::UnknownEntry(key));
        }
        let parsed_time = match column {
            EntryColumn::StartTime | EntryColumn::EndTime => Some(parse_timestamp(value)?),
            _ => None,
        };

        let entry = self.entries.get_mut(&key).expect("key checked above");
        match column {
            EntryColumn::StartTime => entry.start_time = parsed_time.expect("parsed above"),
            EntryColumn::EndTime => entry.end_time = parsed_time.expect("parsed above"),
            EntryColumn::OriginalText => entry.original_text = value.to_string(),
            EntryColumn::TranslatedText => entry.translated_text = value.to_string(),
        }
        if !entry.is_valid() {
            warn!("Entry {} has end time at or before start time", key);
        }
        self.emit(DocumentEvent::EntriesChanged(vec![key]));
        Ok(())
    }

    fn reindex(entries: Vec<SubtitleEntry>) -> BTreeMap<u32, SubtitleEntry> {
        entries
            .into_iter()
            .enumerate()
            .map(|(position, entry)| (position as u32 + 1, entry))
            .collect()
    }

    fn emit(&self, event: DocumentEvent) {
        if let Some(sink) = &self.events {
            // A disconnected consumer is not an error for the document
            let _ = sink.send(event);
        }
    }
}

/// Format milliseconds as `hh:mm:ss.zzz`
pub fn format_timestamp(milliseconds: u64) -> String {
    let hours = milliseconds / 3_600_000;
    let minutes = (milliseconds % 3_600_000) / 60_000;
    let seconds = (milliseconds % 60_000) / 1_000;
    let millis = milliseconds % 1_000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

/// Parse a `hh:mm:ss.zzz` timestamp into milliseconds. The SRT variant
/// with a comma before the milliseconds is accepted as well.
pub fn parse_timestamp(value: &str) -> Result<u64> {
    let malformed = || SubflowError::MalformedTimestamp(value.to_string());

    let value = value.trim();
    let mut clock = value.splitn(3, ':');
    let hours = clock.next().ok_or_else(malformed)?;
    let minutes = clock.next().ok_or_else(malformed)?;
    let rest = clock.next().ok_or_else(malformed)?;
    let (seconds, millis) = rest
        .split_once(['.', ','])
        .ok_or_else(malformed)?;

    if millis.len() != 3 {
        return Err(malformed());
    }

    let hours: u64 = hours.parse().map_err(|_| malformed())?;
    let minutes: u64 = minutes.parse().map_err(|_| malformed())?;
    let seconds: u64 = seconds.parse().map_err(|_| malformed())?;
    let millis: u64 = millis.parse().map_err(|_| malformed())?;

    if minutes >= 60 || seconds >= 60 {
        return Err(malformed());
    }

    Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn three_entry_document() -> SubtitleDocument {
        SubtitleDocument::from_entries(vec![
            SubtitleEntry::new(0, 1000, "a", "A"),
            SubtitleEntry::new(1000, 2000, "b", "B"),
            SubtitleEntry::new(2000, 3000, "c", "C"),
        ])
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "00:00:00.000");
        assert_eq!(format_timestamp(65_123), "00:01:05.123");
        assert_eq!(format_timestamp(3_661_500), "01:01:01.500");
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("00:00:00.000").unwrap(), 0);
        assert_eq!(parse_timestamp("00:01:05.123").unwrap(), 65_123);
        assert_eq!(parse_timestamp("01:01:01,500").unwrap(), 3_661_500);
        assert!(parse_timestamp("garbage").is_err());
        assert!(parse_timestamp("00:99:00.000").is_err());
        assert!(parse_timestamp("00:00:00.1").is_err());
    }

    #[test]
    fn test_from_entries_issues_dense_keys() {
        let document = three_entry_document();
        assert_eq!(
            document.entries().keys().copied().collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_merge_adjacent_rows() {
        let mut document = three_entry_document();
        assert!(document.merge_rows(&[0, 1]).unwrap());

        assert_eq!(document.len(), 2);
        let merged = document.get(1).unwrap();
        assert_eq!(merged.start_time, 0);
        assert_eq!(merged.end_time, 2000);
        assert_eq!(merged.original_text, "a b");
        assert_eq!(merged.translated_text, "A B");

        let tail = document.get(2).unwrap();
        assert_eq!(tail.start_time, 2000);
        assert_eq!(tail.end_time, 3000);
        assert_eq!(tail.original_text, "c");
    }

    #[test]
    fn test_merge_non_contiguous_rows_collapses_into_first_position() {
        let mut document = three_entry_document();
        assert!(document.merge_rows(&[0, 2]).unwrap());

        assert_eq!(document.len(), 2);
        let merged = document.get(1).unwrap();
        assert_eq!(merged.start_time, 0);
        assert_eq!(merged.end_time, 3000);
        assert_eq!(merged.original_text, "a c");
        // The unselected middle row keeps its relative order after the merge
        assert_eq!(document.get(2).unwrap().original_text, "b");
    }

    #[test]
    fn test_merge_single_row_is_a_no_op() {
        let (sink, mut events) = unbounded_channel();
        let mut document = three_entry_document();
        document.set_event_sink(sink);

        assert!(!document.merge_rows(&[1]).unwrap());
        assert!(!document.merge_rows(&[]).unwrap());
        assert_eq!(document.len(), 3);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_merge_emits_replaced_event() {
        let (sink, mut events) = unbounded_channel();
        let mut document = three_entry_document();
        document.set_event_sink(sink);

        document.merge_rows(&[0, 1]).unwrap();
        assert_eq!(events.try_recv().unwrap(), DocumentEvent::EntriesReplaced);
    }

    #[test]
    fn test_set_cell_text_columns() {
        let (sink, mut events) = unbounded_channel();
        let mut document = three_entry_document();
        document.set_event_sink(sink);

        document
            .set_cell(2, EntryColumn::OriginalText, "edited")
            .unwrap();
        document
            .set_cell(2, EntryColumn::TranslatedText, "EDITED")
            .unwrap();

        let entry = document.get(2).unwrap();
        assert_eq!(entry.original_text, "edited");
        assert_eq!(entry.translated_text, "EDITED");
        assert_eq!(
            events.try_recv().unwrap(),
            DocumentEvent::EntriesChanged(vec![2])
        );
    }

    #[test]
    fn test_set_cell_parses_time_columns() {
        let mut document = three_entry_document();
        document
            .set_cell(1, EntryColumn::EndTime, "00:00:01.500")
            .unwrap();
        assert_eq!(document.get(1).unwrap().end_time, 1500);
    }

    #[test]
    fn test_set_cell_rejects_malformed_timestamp() {
        let mut document = three_entry_document();
        let result = document.set_cell(1, EntryColumn::StartTime, "not a time");
        assert!(matches!(
            result,
            Err(SubflowError::MalformedTimestamp(_))
        ));
        // Entry is untouched on rejection
        assert_eq!(document.get(1).unwrap().start_time, 0);
    }

    #[test]
    fn test_set_cell_unknown_key() {
        let mut document = three_entry_document();
        assert!(matches!(
            document.set_cell(99, EntryColumn::OriginalText, "x"),
            Err(SubflowError::UnknownEntry(99))
        ));
    }

    #[test]
    fn test_point_edit_does_not_reindex() {
        let mut document = three_entry_document();
        document
            .set_cell(3, EntryColumn::OriginalText, "still third")
            .unwrap();
        assert_eq!(
            document.entries().keys().copied().collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_apply_updates_splits_combined_text() {
        let mut document = three_entry_document();
        let mut updates = BTreeMap::new();
        updates.insert(1, "hello\nbonjour".to_string());
        updates.insert(2, "only translated".to_string());
        document.apply_updates(&updates);

        assert_eq!(document.get(1).unwrap().original_text, "hello");
        assert_eq!(document.get(1).unwrap().translated_text, "bonjour");
        assert_eq!(document.get(2).unwrap().original_text, "b");
        assert_eq!(document.get(2).unwrap().translated_text, "only translated");
    }

    #[test]
    fn test_invalid_time_edit_is_kept_but_flagged() {
        let mut document = three_entry_document();
        document
            .set_cell(2, EntryColumn::EndTime, "00:00:00.500")
            .unwrap();
        let entry = document.get(2).unwrap();
        assert_eq!(entry.end_time, 500);
        assert!(!entry.is_valid());
    }
}
