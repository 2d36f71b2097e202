//! Delimited text parsing
//!
//! Turns text entries into one record per line, split on whitespace.
//! Blank lines and `#` comment lines are skipped.

use std::collections::VecDeque;

use super::entry::RawEntry;
use crate::error::{PetError, Result};

/// One parsed line of a text entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    /// Path of the entry the line came from
    pub path: String,
    /// 1-based line number within the entry
    pub line: usize,
    /// Whitespace-separated fields
    pub fields: Vec<String>,
}

/// Split an entry's content into line records.
///
/// Content that is not valid UTF-8 fails the whole entry.
pub fn parse_lines(entry: &RawEntry) -> Result<Vec<LineRecord>> {
    let text = std::str::from_utf8(&entry.data).map_err(|e| PetError::InvalidEncoding {
        path: entry.path.clone(),
        offset: e.valid_up_to(),
    })?;

    Ok(text
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                return None;
            }
            Some(LineRecord {
                path: entry.path.clone(),
                line: idx + 1,
                fields: trimmed.split_whitespace().map(str::to_string).collect(),
            })
        })
        .collect())
}

/// Lazily flattens text entries into line records, one entry at a time
pub struct LineRecords<I> {
    source: I,
    current: VecDeque<LineRecord>,
}

impl<I> LineRecords<I>
where
    I: Iterator<Item = Result<RawEntry>>,
{
    pub fn new(source: I) -> Self {
        Self {
            source,
            current: VecDeque::new(),
        }
    }
}

impl<I> Iterator for LineRecords<I>
where
    I: Iterator<Item = Result<RawEntry>>,
{
    type Item = Result<LineRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.current.pop_front() {
                return Some(Ok(record));
            }
            match self.source.next()? {
                Ok(entry) => match parse_lines(&entry) {
                    Ok(records) => self.current = records.into(),
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
