// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WindowError>;

#[derive(Debug, Error)]
pub enum WriteFailure {
    #[error("window is not open for writing")]
    ReadOnlyMode,
    #[error("refusing to write an empty line")]
    EmptyLine,
    #[error("failed to resize backing file to {len} bytes: {source}")]
    Resize {
        len: u64,
        #[source]
        source: io::Error,
    },
    #[error("failed to flush written bytes: {0}")]
    Flush(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("failed to open {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to stat {path}: {source}")]
    FileStat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("offset {offset} is not before the end of the file ({file_len} bytes)")]
    InvalidOffset { offset: u64, file_len: u64 },
    #[error("failed to map {len} bytes at file offset {offset}: {source}")]
    Map {
        offset: u64,
        len: usize,
        #[source]
        source: io::Error,
    },
    #[error("position {position} exceeds mapped length {mapped_len}")]
    InvalidPosition { position: usize, mapped_len: usize },
    #[error("window is not mapped")]
    NotMapped,
    #[error("write failed: {0}")]
    Write(#[from] WriteFailure),
    #[error("window was opened write-only")]
    ReadForbidden,
    #[error("line at offset {offset} is {len} bytes, which does not fit a {window_size} byte window")]
    LineTooLong {
        offset: u64,
        len: u64,
        window_size: usize,
    },
    #[error("line span from generation {span} is stale (window is at generation {current})")]
    StaleView { span: u64, current: u64 },
}

/// Copyable error code retained as a window's last error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowErrorKind {
    FileOpenFailed,
    FileStatFailed,
    MapFailed,
    InvalidOffset,
    InvalidPosition,
    NotMapped,
    EndOfFile,
    WriteError,
    ReadForbidden,
    LineTooLong,
    StaleView,
}

impl WindowError {
    pub fn kind(&self) -> WindowErrorKind {
        match self {
            WindowError::FileOpen { .. } => WindowErrorKind::FileOpenFailed,
            WindowError::FileStat { .. } => WindowErrorKind::FileStatFailed,
            WindowError::InvalidOffset { .. } => WindowErrorKind::InvalidOffset,
            WindowError::Map { .. } => WindowErrorKind::MapFailed,
            WindowError::InvalidPosition { .. } => WindowErrorKind::InvalidPosition,
            WindowError::NotMapped => WindowErrorKind::NotMapped,
            WindowError::Write(_) => WindowErrorKind::WriteError,
            WindowError::ReadForbidden => WindowErrorKind::ReadForbidden,
            WindowError::LineTooLong { .. } => WindowErrorKind::LineTooLong,
            WindowError::StaleView { .. } => WindowErrorKind::StaleView,
        }
    }

    /// True when the window can no longer serve reads after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WindowError::FileOpen { .. }
                | WindowError::FileStat { .. }
                | WindowError::InvalidOffset { .. }
                | WindowError::Map { .. }
                | WindowError::NotMapped
        )
    }
}
