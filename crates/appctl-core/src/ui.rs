//! User-facing output sink
//!
//! The orchestration layer only ever writes plain lines: informational text
//! and `OK` go to the output stream, warnings go to the error stream. The
//! binary renders them on a terminal; tests use [`BufferedUi`] to assert on
//! ordering across both streams.

use std::sync::{Mutex, PoisonError};

use crate::event::Warnings;

/// Output sink shared by the consumer, the wait controller and the roller
pub trait Ui: Send + Sync {
    /// Write one line to the output stream
    fn display_text(&self, text: &str);

    /// Write one warning line to the error stream
    fn display_warning(&self, warning: &str);

    /// Write every warning, in order
    fn display_warnings(&self, warnings: &Warnings) {
        for warning in warnings {
            self.display_warning(warning);
        }
    }

    fn display_ok(&self) {
        self.display_text("OK");
    }

    fn display_new_line(&self) {
        self.display_text("");
    }
}

/// Which stream a line was written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiStream {
    Out,
    Err,
}

/// One recorded line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiLine {
    pub stream: UiStream,
    pub text: String,
}

/// In-memory [`Ui`] that keeps a single ordered log of both streams
#[derive(Debug, Default)]
pub struct BufferedUi {
    lines: Mutex<Vec<UiLine>>,
}

impl BufferedUi {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, stream: UiStream, text: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(UiLine {
                stream,
                text: text.to_string(),
            });
    }

    /// Every line in the order it was written
    pub fn lines(&self) -> Vec<UiLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Text of every line in the order it was written, streams interleaved
    pub fn transcript(&self) -> Vec<String> {
        self.lines().into_iter().map(|line| line.text).collect()
    }

    /// Lines written to the output stream
    pub fn out(&self) -> Vec<String> {
        self.filtered(UiStream::Out)
    }

    /// Lines written to the error stream
    pub fn err(&self) -> Vec<String> {
        self.filtered(UiStream::Err)
    }

    fn filtered(&self, stream: UiStream) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.stream == stream)
            .map(|line| line.text)
            .collect()
    }
}

impl Ui for BufferedUi {
    fn display_text(&self, text: &str) {
        self.record(UiStream::Out, text);
    }

    fn display_warning(&self, warning: &str) {
        self.record(UiStream::Err, warning);
    }
}
