// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::{
    error::{Result, WindowError, WindowErrorKind, WriteFailure},
    line::{LineSpan, LineView},
    page::{page_size, WindowPlan},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl OpenMode {
    pub fn is_readable(self) -> bool {
        !matches!(self, OpenMode::WriteOnly)
    }

    pub fn is_writable(self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }
}

enum Mapping {
    Unmapped,
    Read(Mmap),
    Write(MmapMut),
}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        match self {
            Mapping::Unmapped => &[],
            Mapping::Read(map) => &map[..],
            Mapping::Write(map) => &map[..],
        }
    }

    fn len(&self) -> usize {
        self.bytes().len()
    }
}

/// A page-aligned mapping over part (or all) of a file, read or written one line at a
/// time.
///
/// Positions reported by [`position`](Self::position) and accepted by
/// [`set_position`](Self::set_position) are relative to the start of the current
/// mapping, which is [`window_start`](Self::window_start) bytes into the file.
pub struct MappedWindow {
    path: PathBuf,
    file: Option<File>,
    mapping: Mapping,
    file_len: u64,
    initial_len: u64,
    window_start: u64,
    window_size: usize,
    origin: usize,
    cursor: usize,
    mode: OpenMode,
    valid: bool,
    last_error: Option<WindowErrorKind>,
    generation: u64,
    high_water: u64,
    grown: bool,
}

impl MappedWindow {
    /// Maps the whole file. An empty file yields a valid window with nothing mapped.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let (file, file_len) = open_file(path, mode)?;
        let window_size = usize::try_from(file_len).unwrap_or(usize::MAX);
        let mut window = Self::new(path, file, file_len, window_size, mode);
        window.map_range(0, window_size)?;
        Ok(window)
    }

    /// Maps `len` bytes starting at `offset` (capped at the end of the file) with the
    /// cursor on `offset`.
    pub fn open_range(
        path: impl AsRef<Path>,
        offset: u64,
        len: usize,
        mode: OpenMode,
    ) -> Result<Self> {
        let path = path.as_ref();
        let (file, file_len) = open_file(path, mode)?;
        if offset >= file_len {
            return Err(WindowError::InvalidOffset { offset, file_len });
        }
        let mut window = Self::new(path, file, file_len, len, mode);
        window.map_range(offset, len)?;
        Ok(window)
    }

    /// Maps the first `window_size` bytes of the file; later windows are mapped on
    /// demand by extending reads. Empty files are accepted. A `window_size` of zero
    /// maps the whole file.
    pub fn open_window(path: impl AsRef<Path>, window_size: usize, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let (file, file_len) = open_file(path, mode)?;
        let window_size = if window_size == 0 {
            usize::try_from(file_len).unwrap_or(usize::MAX)
        } else {
            window_size
        };
        let mut window = Self::new(path, file, file_len, window_size, mode);
        window.map_range(0, window_size)?;
        Ok(window)
    }

    fn new(path: &Path, file: File, file_len: u64, window_size: usize, mode: OpenMode) -> Self {
        Self {
            path: path.to_path_buf(),
            file: Some(file),
            mapping: Mapping::Unmapped,
            file_len,
            initial_len: file_len,
            window_start: 0,
            window_size,
            origin: 0,
            cursor: 0,
            mode,
            valid: true,
            last_error: None,
            generation: 0,
            high_water: 0,
            grown: false,
        }
    }

    /// Reads the next line without its `\n`, copying it out of the mapping.
    ///
    /// Returns `Ok(None)` at end of file. With `extend`, the window slides forward
    /// whenever the cursor reaches its end before the file does.
    pub fn read_line(&mut self, extend: bool) -> Result<Option<Vec<u8>>> {
        Ok(self.read_line_view(extend)?.map(|view| view.to_vec()))
    }

    /// Like [`read_line`](Self::read_line) but borrows the line from the mapping.
    pub fn read_line_view(&mut self, extend: bool) -> Result<Option<LineView<'_>>> {
        let Some((start, end)) = self.next_line(extend)? else {
            return Ok(None);
        };
        Ok(Some(LineView {
            bytes: &self.mapping.bytes()[start..end],
            file_offset: self.window_start + start as u64,
            generation: self.generation,
        }))
    }

    /// Reads the next line as a detached span; see [`resolve`](Self::resolve).
    pub fn read_line_span(&mut self, extend: bool) -> Result<Option<LineSpan>> {
        Ok(self.next_line(extend)?.map(|(start, end)| LineSpan {
            generation: self.generation,
            start,
            end,
            file_offset: self.window_start + start as u64,
        }))
    }

    /// Returns the bytes of `span`, or `StaleView` if the window has moved since or the
    /// span does not fit the current mapping.
    pub fn resolve(&self, span: &LineSpan) -> Result<&[u8]> {
        if !self.valid {
            return Err(WindowError::NotMapped);
        }
        let stale = WindowError::StaleView {
            span: span.generation,
            current: self.generation,
        };
        if span.generation != self.generation {
            return Err(stale);
        }
        self.mapping.bytes().get(span.start..span.end).ok_or(stale)
    }

    /// Writes `text` followed by `\n` at the cursor, doubling the file as needed, and
    /// flushes the written bytes before returning.
    pub fn write_line(&mut self, text: &[u8]) -> Result<()> {
        if !self.valid {
            return self.fail(WindowError::NotMapped);
        }
        if !self.mode.is_writable() {
            return self.fail(WriteFailure::ReadOnlyMode.into());
        }
        if text.is_empty() {
            return self.fail(WriteFailure::EmptyLine.into());
        }

        let needed = text.len() + 1;
        let required = self.cursor + needed;
        if required > self.mapping.len() {
            self.grow(required)?;
        }

        let cursor = self.cursor;
        let flushed = match &mut self.mapping {
            Mapping::Write(map) => {
                map[cursor..cursor + text.len()].copy_from_slice(text);
                map[cursor + text.len()] = b'\n';
                Some(map.flush_range(cursor, needed))
            }
            _ => None,
        };
        match flushed {
            None => self.fail(WindowError::NotMapped),
            Some(Err(source)) => self.fail(WriteFailure::Flush(source).into()),
            Some(Ok(())) => {
                self.cursor = required;
                self.high_water = self.high_water.max(self.window_start + required as u64);
                Ok(())
            }
        }
    }

    /// Moves the cursor back to where the current mapping's reads began.
    pub fn reset(&mut self) -> Result<()> {
        if !self.valid {
            return self.fail(WindowError::NotMapped);
        }
        self.cursor = self.origin;
        Ok(())
    }

    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if !self.valid {
            return self.fail(WindowError::NotMapped);
        }
        let mapped_len = self.mapping.len();
        if position > mapped_len {
            return self.fail(WindowError::InvalidPosition {
                position,
                mapped_len,
            });
        }
        self.cursor = position;
        Ok(())
    }

    /// Unmaps the window and closes the file. A file grown by writes is cut back to the
    /// last byte written.
    pub fn close(&mut self) {
        self.release();
        self.file = None;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn last_error(&self) -> Option<WindowErrorKind> {
        self.last_error
    }

    pub fn mapped_len(&self) -> usize {
        self.mapping.len()
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn file_position(&self) -> u64 {
        self.window_start + self.cursor as u64
    }

    pub fn window_start(&self) -> u64 {
        self.window_start
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Incremented every time the mapping is replaced or released.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_eof(&self) -> bool {
        self.cursor >= self.mapping.len()
    }

    fn window_end(&self) -> u64 {
        self.window_start + self.mapping.len() as u64
    }

    /// Locates the next line as `[start, end)` within the current mapping.
    fn next_line(&mut self, extend: bool) -> Result<Option<(usize, usize)>> {
        if !self.valid {
            return self.fail(WindowError::NotMapped);
        }
        if !self.mode.is_readable() {
            return self.fail(WindowError::ReadForbidden);
        }

        loop {
            let mapped_len = self.mapping.len();
            if self.cursor >= mapped_len {
                let window_end = self.window_end();
                if extend && self.window_size > 0 && window_end < self.file_len {
                    self.remap_at(window_end)?;
                    continue;
                }
                self.last_error = Some(WindowErrorKind::EndOfFile);
                return Ok(None);
            }

            let start = self.cursor;
            if let Some(idx) = find_newline(&self.mapping.bytes()[start..]) {
                let end = start + idx;
                self.cursor = end + 1;
                return Ok(Some((start, end)));
            }

            let window_end = self.window_end();
            if !extend || self.window_size == 0 || window_end >= self.file_len {
                self.cursor = mapped_len;
                return Ok(Some((start, mapped_len)));
            }

            // Re-map so the partial line starts the next window; if a full window from
            // there still cannot reach its terminator, the line is skipped.
            let line_offset = self.window_start + start as u64;
            if line_offset + self.window_size as u64 <= window_end {
                return self.skip_oversized(line_offset);
            }
            self.remap_at(line_offset)?;
        }
    }

    fn skip_oversized<T>(&mut self, line_offset: u64) -> Result<T> {
        loop {
            let start = self.cursor;
            if let Some(idx) = find_newline(&self.mapping.bytes()[start..]) {
                let end = start + idx;
                self.cursor = end + 1;
                let len = self.window_start + end as u64 - line_offset;
                return self.too_long(line_offset, len);
            }
            let window_end = self.window_end();
            if window_end >= self.file_len {
                self.cursor = self.mapping.len();
                return self.too_long(line_offset, self.file_len - line_offset);
            }
            self.remap_at(window_end)?;
        }
    }

    fn too_long<T>(&mut self, offset: u64, len: u64) -> Result<T> {
        debug!(
            "{}: skipped {len} byte line at offset {offset}",
            self.path.display()
        );
        self.fail(WindowError::LineTooLong {
            offset,
            len,
            window_size: self.window_size,
        })
    }

    fn grow(&mut self, required: usize) -> Result<()> {
        let mapped = self.mapping.len();
        let mut new_len = if mapped == 0 {
            required
        } else {
            mapped.saturating_mul(2)
        };
        while new_len < required {
            new_len = new_len.saturating_mul(2);
        }

        let target = self.window_start + new_len as u64;
        if target > self.file_len {
            let resized = match &self.file {
                Some(file) => file.set_len(target),
                None => return self.fail(WindowError::NotMapped),
            };
            if let Err(source) = resized {
                return self.fail(WriteFailure::Resize { len: target, source }.into());
            }
            debug!(
                "{}: grew file from {} to {target} bytes",
                self.path.display(),
                self.file_len
            );
            self.file_len = target;
            self.grown = true;
        }

        let cursor = self.cursor;
        let origin = self.origin;
        self.window_size = self.window_size.max(new_len);
        self.remap_at(self.window_start)?;
        self.cursor = cursor;
        self.origin = origin;
        Ok(())
    }

    /// Replaces the mapping with one starting at `offset`; a failure leaves the window
    /// released.
    fn remap_at(&mut self, offset: u64) -> Result<()> {
        match self.map_range(offset, self.window_size) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("{}: {err}; releasing window", self.path.display());
                self.release();
                self.fail(err)
            }
        }
    }

    fn map_range(&mut self, offset: u64, len: usize) -> Result<()> {
        let plan = WindowPlan::new(offset, len, self.file_len, page_size());
        self.mapping = Mapping::Unmapped;
        let Some(file) = &self.file else {
            return Err(WindowError::NotMapped);
        };
        self.mapping =
            map_file(file, self.mode, plan.start, plan.map_len).map_err(|source| {
                WindowError::Map {
                    offset: plan.start,
                    len: plan.map_len,
                    source,
                }
            })?;
        self.window_start = plan.start;
        self.origin = plan.delta;
        self.cursor = plan.delta;
        self.generation += 1;
        Ok(())
    }

    fn release(&mut self) {
        if !self.valid {
            return;
        }
        self.mapping = Mapping::Unmapped;
        if self.grown {
            let keep = self.high_water.max(self.initial_len);
            if let Some(file) = &self.file {
                match file.set_len(keep) {
                    Ok(()) => self.file_len = keep,
                    Err(err) => warn!(
                        "{}: failed to trim file to {keep} bytes: {err}",
                        self.path.display()
                    ),
                }
            }
            self.grown = false;
        }
        self.valid = false;
        self.cursor = 0;
        self.origin = 0;
        self.generation += 1;
    }

    fn fail<T>(&mut self, err: WindowError) -> Result<T> {
        self.last_error = Some(err.kind());
        Err(err)
    }
}

impl Drop for MappedWindow {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MappedWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedWindow")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("valid", &self.valid)
            .field("window_start", &self.window_start)
            .field("mapped_len", &self.mapping.len())
            .field("cursor", &self.cursor)
            .field("file_len", &self.file_len)
            .field("generation", &self.generation)
            .finish()
    }
}

fn open_file(path: &Path, mode: OpenMode) -> Result<(File, u64)> {
    let mut options = OpenOptions::new();
    options.read(true);
    if mode.is_writable() {
        options.write(true).create(true).truncate(false);
    }
    let file = options.open(path).map_err(|source| WindowError::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let file_len = file
        .metadata()
        .map_err(|source| WindowError::FileStat {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    Ok((file, file_len))
}

fn map_file(file: &File, mode: OpenMode, start: u64, len: usize) -> io::Result<Mapping> {
    if len == 0 {
        return Ok(Mapping::Unmapped);
    }
    let mut options = MmapOptions::new();
    options.offset(start).len(len);
    // The file is only ever shrunk after its mapping has been dropped.
    let mapping = if mode.is_writable() {
        Mapping::Write(unsafe { options.map_mut(file)? })
    } else {
        Mapping::Read(unsafe { options.map(file)? })
    };
    Ok(mapping)
}

fn find_newline(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&b| b == b'\n')
}
