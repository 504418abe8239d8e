//! Document parser seam.
//!
//! Decoding bytes into text blocks is collaborator work; the pipeline only
//! routes it. The reference implementation covers the plain-text family
//! (txt, md, csv) so the crate is exercisable end to end; binary formats
//! belong to richer parsers behind the same trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::types::ChunkLocation;

/// A decoded span of document text with its source location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub location: ChunkLocation,
}

/// Decodes raw document bytes into ordered text blocks.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Decode `bytes` according to the filename's extension.
    ///
    /// Fails with [`ParseError::UnsupportedFormat`] when the format is not
    /// handled; the pipeline reports that to the submitter without retrying.
    async fn parse(&self, bytes: &[u8], filename: &str) -> Result<Vec<TextBlock>, ParseError>;
}

/// Reference parser for plain-text formats.
#[derive(Debug, Clone, Default)]
pub struct PlainTextParser;

impl PlainTextParser {
    pub fn new() -> Self {
        Self
    }

    fn decode(bytes: &[u8]) -> Result<String, ParseError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| ParseError::Decode {
            message: e.to_string(),
        })
    }

    /// Paragraph blocks with 1-based ordinals.
    fn parse_text(text: &str) -> Vec<TextBlock> {
        text.split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .enumerate()
            .map(|(i, paragraph)| TextBlock {
                text: paragraph.to_string(),
                location: ChunkLocation::Paragraph { ordinal: i + 1 },
            })
            .collect()
    }

    /// Header block plus row-group blocks of at most `CSV_ROWS_PER_BLOCK`
    /// lines each. Line-oriented: quoted embedded newlines are not handled.
    fn parse_csv(text: &str) -> Vec<TextBlock> {
        const CSV_ROWS_PER_BLOCK: usize = 10;

        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = match lines.next() {
            Some(header) => header,
            None => return Vec::new(),
        };

        let mut blocks = vec![TextBlock {
            text: format!("CSV headers: {header}"),
            location: ChunkLocation::Row { line: 0 },
        }];

        let rows: Vec<&str> = lines.collect();
        for (group, rows) in rows.chunks(CSV_ROWS_PER_BLOCK).enumerate() {
            blocks.push(TextBlock {
                text: rows.join("\n"),
                location: ChunkLocation::Row {
                    line: group * CSV_ROWS_PER_BLOCK + 1,
                },
            });
        }
        blocks
    }
}

#[async_trait]
impl DocumentParser for PlainTextParser {
    async fn parse(&self, bytes: &[u8], filename: &str) -> Result<Vec<TextBlock>, ParseError> {
        let extension = filename
            .rsplit('.')
            .next()
            .filter(|ext| *ext != filename)
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "txt" | "md" => Ok(Self::parse_text(&Self::decode(bytes)?)),
            "csv" => Ok(Self::parse_csv(&Self::decode(bytes)?)),
            _ => Err(ParseError::UnsupportedFormat { extension }),
        }
    }
}
