// THEORY:
// A pose source is anything that yields timestamped landmark sets in order: a live
// pose model, a recorded clip, or a hand-built list in a test. The engine never
// cares which. Recorded clips are JSON lines, one tick per line, so a session can
// be captured on a device and replayed bit-for-bit on a workstation.

use crate::core_modules::landmark::landmark::NormalizedLandmark;
use crate::core_modules::pose_frame::pose_frame::{Millis, SubjectId};
use crate::error::ClipError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::BufRead;
use tracing::warn;

/// One inference tick: a monotonic timestamp and whatever the pose model produced
/// for one tracked person.
///
/// An empty landmark list means the person was not detected. Single-person clips
/// leave `subject` out and are all subject 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseTick {
    pub timestamp_ms: Millis,
    #[serde(default)]
    pub subject: SubjectId,
    #[serde(default)]
    pub landmarks: Vec<NormalizedLandmark>,
}

impl PoseTick {
    pub fn new(timestamp_ms: Millis, landmarks: Vec<NormalizedLandmark>) -> Self {
        Self {
            timestamp_ms,
            subject: 0,
            landmarks,
        }
    }

    pub fn with_subject(mut self, subject: SubjectId) -> Self {
        self.subject = subject;
        self
    }
}

pub trait PoseSource {
    /// The next tick in timestamp order, or `None` once the source is exhausted.
    fn next_tick(&mut self) -> Option<PoseTick>;
}

/// An in-memory list of ticks.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    ticks: VecDeque<PoseTick>,
}

impl VecSource {
    pub fn new(ticks: impl IntoIterator<Item = PoseTick>) -> Self {
        Self {
            ticks: ticks.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.ticks.len()
    }
}

impl PoseSource for VecSource {
    fn next_tick(&mut self) -> Option<PoseTick> {
        self.ticks.pop_front()
    }
}

/// Streams ticks from a JSON-lines clip.
///
/// Lines that fail to read or parse are logged and skipped; use [`read_clip`] when a
/// malformed clip should be an error instead.
pub struct ClipSource<R> {
    reader: R,
    line_number: usize,
    skipped: usize,
    buffer: String,
}

impl<R: BufRead> ClipSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            skipped: 0,
            buffer: String::new(),
        }
    }

    /// Number of lines that could not be parsed so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn next_line(&mut self) -> Option<Result<PoseTick, ClipError>> {
        loop {
            self.buffer.clear();
            match self.reader.read_line(&mut self.buffer) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => return Some(Err(ClipError::Io(err))),
            }
            self.line_number += 1;

            let line = self.buffer.trim();
            if line.is_empty() {
                continue;
            }
            return Some(parse_line(line, self.line_number));
        }
    }
}

impl<R: BufRead> PoseSource for ClipSource<R> {
    fn next_tick(&mut self) -> Option<PoseTick> {
        loop {
            match self.next_line()? {
                Ok(tick) => return Some(tick),
                Err(ClipError::Io(err)) => {
                    warn!(line = self.line_number, error = %err, "clip read failed, stopping");
                    return None;
                }
                Err(err) => {
                    self.skipped += 1;
                    warn!(error = %err, "skipping unreadable clip line");
                }
            }
        }
    }
}

/// Reads a whole clip, failing on the first malformed line.
pub fn read_clip<R: BufRead>(reader: R) -> Result<Vec<PoseTick>, ClipError> {
    let mut source = ClipSource::new(reader);
    let mut ticks = Vec::new();
    while let Some(tick) = source.next_line() {
        ticks.push(tick?);
    }
    Ok(ticks)
}

fn parse_line(line: &str, line_number: usize) -> Result<PoseTick, ClipError> {
    serde_json::from_str(line).map_err(|source| ClipError::Parse {
        line: line_number,
        source,
    })
}
