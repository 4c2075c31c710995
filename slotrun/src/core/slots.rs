//! Slot-file parsing and structured editing.
//!
//! An instruction set is a flat text file. A line of the form `// slot N`
//! (or `// command N`, the two are interchangeable) starts a labeled
//! fragment that extends to the next header line or end of file. The whole
//! file is parsed once into an ordered record sequence; reads and edits
//! operate on that sequence and edits serialize back to text, so no
//! mutation ever pattern-matches against raw text.

use std::sync::LazyLock;

use regex::Regex;

/// Header marker: optional leading whitespace, `//`, optional whitespace,
/// the literal `slot` or `command`, whitespace, an integer id, end of line.
static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*//[ \t]*(?:slot|command)[ \t]+(\d+)[ \t]*\r?$").unwrap()
});

/// One labeled fragment: the id from its header line plus the trimmed body.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SlotRecord {
    id: u32,
    body: String,
}

/// An instruction-set file parsed into an ordered record sequence.
///
/// Record order is file order. Ids are not required to be unique or sorted;
/// lookups take the first record with a matching id, mirroring extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotFile {
    /// Text before the first header, preserved across edits.
    leading: String,
    records: Vec<SlotRecord>,
}

impl SlotFile {
    /// Parse source text by scanning every header line once.
    ///
    /// Body spans run from the line after each header to the next header or
    /// end of file and are whitespace-trimmed, so blank padding between
    /// fragments never reaches execution. A header followed immediately by
    /// another header yields an empty body, which is a valid fragment.
    pub fn parse(text: &str) -> Self {
        // A labeled line whose digits overflow u32 is not a header at all;
        // filtering before span computation keeps its text in the enclosing
        // body instead of orphaning it.
        let matches: Vec<(u32, std::ops::Range<usize>)> = HEADER_RE
            .captures_iter(text)
            .filter_map(|caps| {
                let id = caps.get(1).unwrap().as_str().parse::<u32>().ok()?;
                Some((id, caps.get(0).unwrap().range()))
            })
            .collect();

        let leading = match matches.first() {
            Some((_, span)) => text[..span.start].trim_end().to_string(),
            None => text.trim_end().to_string(),
        };

        let mut records = Vec::with_capacity(matches.len());
        for (i, (id, span)) in matches.iter().enumerate() {
            let end = matches
                .get(i + 1)
                .map(|(_, next)| next.start)
                .unwrap_or(text.len());
            records.push(SlotRecord {
                id: *id,
                body: text[span.end..end].trim().to_string(),
            });
        }

        Self { leading, records }
    }

    /// Trimmed body of the first record labeled `id`, if any.
    ///
    /// Header order and unrelated slots do not affect the result. `Some("")`
    /// means the slot exists with an empty body; `None` means it is absent.
    pub fn extract(&self, id: u32) -> Option<&str> {
        self.records
            .iter()
            .find(|record| record.id == id)
            .map(|record| record.body.as_str())
    }

    pub fn contains(&self, id: u32) -> bool {
        self.records.iter().any(|record| record.id == id)
    }

    /// Sorted, deduplicated ids present in the file.
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.records.iter().map(|record| record.id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Replace the body of the first record labeled `id`, or append a new
    /// record at the end when the id is absent.
    pub fn upsert(&mut self, id: u32, body: &str) {
        let body = body.trim().to_string();
        match self.records.iter_mut().find(|record| record.id == id) {
            Some(record) => record.body = body,
            None => self.records.push(SlotRecord { id, body }),
        }
    }

    /// Append an empty record unless the id already exists.
    ///
    /// Returns `false` (and leaves the file untouched) for duplicates.
    pub fn insert_empty(&mut self, id: u32) -> bool {
        if self.contains(id) {
            return false;
        }
        self.records.push(SlotRecord {
            id,
            body: String::new(),
        });
        true
    }

    /// Remove the first record labeled `id`. Returns whether one existed.
    pub fn remove(&mut self, id: u32) -> bool {
        match self.records.iter().position(|record| record.id == id) {
            Some(index) => {
                self.records.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every record whose id appears in `ids`, duplicates included.
    ///
    /// Returns the ids that had at least one record, in ascending order.
    pub fn remove_all(&mut self, ids: &[u32]) -> Vec<u32> {
        let mut removed: Vec<u32> = Vec::new();
        self.records.retain(|record| {
            if ids.contains(&record.id) {
                removed.push(record.id);
                false
            } else {
                true
            }
        });
        removed.sort_unstable();
        removed.dedup();
        removed
    }

    /// Serialize back to canonical text.
    ///
    /// Each record becomes `// slot N` plus its body, blank-line separated,
    /// with a single trailing newline. `command` aliases are rewritten to
    /// `slot`; bodies are preserved verbatim.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        if !self.leading.is_empty() {
            out.push_str(&self.leading);
            out.push_str("\n\n");
        }
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("// slot {}\n", record.id));
            if !record.body.is_empty() {
                out.push_str(&record.body);
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "// slot 0\nfirst\n\n// slot 2\n  second line one\n  second line two\n\n// command 5\nfive\n";

    #[test]
    fn extract_returns_trimmed_body() {
        let file = SlotFile::parse("// slot 1\n  code here  \n\n// slot 2\nother\n");
        assert_eq!(file.extract(1), Some("code here"));
    }

    #[test]
    fn extract_preserves_inner_lines() {
        let file = SlotFile::parse(SAMPLE);
        assert_eq!(
            file.extract(2),
            Some("second line one\n  second line two")
        );
    }

    #[test]
    fn extract_accepts_command_alias() {
        let file = SlotFile::parse(SAMPLE);
        assert_eq!(file.extract(5), Some("five"));
    }

    #[test]
    fn extract_unknown_id_is_none() {
        let file = SlotFile::parse(SAMPLE);
        assert_eq!(file.extract(9), None);
    }

    #[test]
    fn adjacent_headers_yield_empty_body() {
        let file = SlotFile::parse("// slot 1\n// slot 2\nbody\n");
        assert_eq!(file.extract(1), Some(""));
        assert_eq!(file.extract(2), Some("body"));
    }

    #[test]
    fn extract_ignores_header_order() {
        let file = SlotFile::parse("// slot 5\nfive\n\n// slot 1\none\n");
        assert_eq!(file.extract(1), Some("one"));
        assert_eq!(file.extract(5), Some("five"));
    }

    #[test]
    fn duplicate_ids_first_record_wins() {
        let file = SlotFile::parse("// slot 3\nfirst\n\n// slot 3\nsecond\n");
        assert_eq!(file.extract(3), Some("first"));
        assert_eq!(file.ids(), vec![3]);
    }

    #[test]
    fn indented_header_is_recognized() {
        let file = SlotFile::parse("  // slot 4\nbody\n");
        assert_eq!(file.extract(4), Some("body"));
    }

    #[test]
    fn mid_line_marker_is_not_a_header() {
        let file = SlotFile::parse("// slot 1\nlet x = 1; // slot 2\nmore\n");
        assert_eq!(file.extract(1), Some("let x = 1; // slot 2\nmore"));
        assert_eq!(file.extract(2), None);
    }

    #[test]
    fn non_numeric_label_is_not_a_header() {
        let file = SlotFile::parse("// slot one\ntext\n// slot 1\nreal\n");
        assert_eq!(file.extract(1), Some("real"));
        assert_eq!(file.ids(), vec![1]);
    }

    #[test]
    fn crlf_headers_parse() {
        let file = SlotFile::parse("// slot 1\r\nwindows\r\n\r\n// slot 2\r\nlines\r\n");
        assert_eq!(file.extract(1), Some("windows"));
        assert_eq!(file.extract(2), Some("lines"));
    }

    #[test]
    fn leading_text_survives_round_trip() {
        let mut file = SlotFile::parse("notes before any slot\n\n// slot 0\nbody\n");
        file.upsert(1, "new");
        let text = file.serialize();
        assert!(text.starts_with("notes before any slot\n\n// slot 0\n"));
        let reparsed = SlotFile::parse(&text);
        assert_eq!(reparsed.extract(0), Some("body"));
        assert_eq!(reparsed.extract(1), Some("new"));
    }

    #[test]
    fn upsert_replaces_existing_body_in_place() {
        let mut file = SlotFile::parse(SAMPLE);
        file.upsert(0, "replaced\n");
        assert_eq!(file.extract(0), Some("replaced"));
        // Position is unchanged: slot 0 still serializes first.
        let text = file.serialize();
        assert!(text.starts_with("// slot 0\nreplaced\n"));
    }

    #[test]
    fn upsert_appends_missing_id_at_end() {
        let mut file = SlotFile::parse("// slot 0\nzero\n");
        file.upsert(7, "seven");
        assert_eq!(file.serialize(), "// slot 0\nzero\n\n// slot 7\nseven\n");
    }

    #[test]
    fn serialize_canonicalizes_command_alias() {
        let file = SlotFile::parse("// command 5\nfive\n");
        assert_eq!(file.serialize(), "// slot 5\nfive\n");
    }

    #[test]
    fn serialize_empty_body_is_header_only() {
        let mut file = SlotFile::default();
        assert!(file.insert_empty(0));
        assert_eq!(file.serialize(), "// slot 0\n");
    }

    #[test]
    fn insert_empty_refuses_duplicate() {
        let mut file = SlotFile::parse("// slot 2\nx\n");
        assert!(!file.insert_empty(2));
        assert_eq!(file.extract(2), Some("x"));
    }

    #[test]
    fn remove_drops_first_occurrence_only() {
        let mut file = SlotFile::parse("// slot 3\nfirst\n\n// slot 3\nsecond\n");
        assert!(file.remove(3));
        assert_eq!(file.extract(3), Some("second"));
        assert!(!file.remove(9));
    }

    #[test]
    fn remove_all_drops_duplicates_and_reports_found_ids() {
        let mut file = SlotFile::parse("// slot 1\na\n\n// slot 2\nb\n\n// slot 1\nc\n");
        let removed = file.remove_all(&[1, 4]);
        assert_eq!(removed, vec![1]);
        assert_eq!(file.ids(), vec![2]);
    }

    #[test]
    fn round_trip_is_stable() {
        let file = SlotFile::parse(SAMPLE);
        let once = file.serialize();
        let twice = SlotFile::parse(&once).serialize();
        assert_eq!(once, twice);
    }
}
