//! Frame sources: where detection results come from.
//!
//! Both variants speak the same JSON-lines detection format. The live
//! source reads from an external tracker process (typically stdin); the
//! file source replays a detection file extracted from a video, looping
//! if asked to.

use crate::types::Detection;
use std::io::BufRead;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: malformed detection: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Live tracker stream (webcam).
    Live,
    /// Pre-extracted detections from a video file.
    File,
}

/// A source that yields detection results on demand.
pub trait FrameSource {
    /// Next detection, `Ok(None)` once the source is exhausted.
    ///
    /// A parse error consumes the offending line; the caller may keep
    /// reading.
    fn next_detection(&mut self) -> Result<Option<Detection>, SourceError>;

    fn kind(&self) -> SourceKind;
}

fn parse_line(line: &str, line_no: usize) -> Option<Result<Detection, SourceError>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        serde_json::from_str(trimmed).map_err(|source| SourceError::Parse {
            line: line_no,
            source,
        }),
    )
}

/// Detections streamed line by line from a reader.
pub struct LiveSource<R> {
    reader: R,
    line_no: usize,
    buf: String,
}

impl<R: BufRead> LiveSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> FrameSource for LiveSource<R> {
    fn next_detection(&mut self) -> Result<Option<Detection>, SourceError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if let Some(parsed) = parse_line(&self.buf, self.line_no) {
                return parsed.map(Some);
            }
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }
}

/// Detections read from a file, replayed in order.
pub struct FileSource {
    lines: Vec<String>,
    cursor: usize,
    looping: bool,
    loops: u32,
    /// Consecutive lines read without a detection.
    barren_run: usize,
}

impl FileSource {
    pub fn open(path: &Path, looping: bool) -> Result<Self, SourceError> {
        let text = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), looping, "opened detection file");
        Ok(Self::from_text(&text, looping))
    }

    pub fn from_text(text: &str, looping: bool) -> Self {
        Self {
            lines: text.lines().map(str::to_owned).collect(),
            cursor: 0,
            looping,
            loops: 0,
            barren_run: 0,
        }
    }

    /// Times the source has wrapped back to the first line.
    pub fn loops(&self) -> u32 {
        self.loops
    }
}

impl FrameSource for FileSource {
    /// A looping source ends once a full pass over the file has produced
    /// no detection.
    fn next_detection(&mut self) -> Result<Option<Detection>, SourceError> {
        loop {
            if self.barren_run >= self.lines.len() {
                return Ok(None);
            }
            if self.cursor >= self.lines.len() {
                if !self.looping {
                    return Ok(None);
                }
                self.cursor = 0;
                self.loops += 1;
            }
            let line_no = self.cursor + 1;
            let line = &self.lines[self.cursor];
            self.cursor += 1;
            match parse_line(line, line_no) {
                Some(Ok(detection)) => {
                    self.barren_run = 0;
                    return Ok(Some(detection));
                }
                Some(Err(e)) => {
                    self.barren_run += 1;
                    return Err(e);
                }
                None => self.barren_run += 1,
            }
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::File
    }
}
