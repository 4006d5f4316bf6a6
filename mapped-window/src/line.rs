use std::ops::Deref;

/// Zero-copy view of one line inside the current mapping.
///
/// The view borrows its [`MappedWindow`](crate::MappedWindow) mutably, so the window
/// cannot be advanced, remapped or released while the view is alive.
#[derive(Debug)]
pub struct LineView<'a> {
    pub(crate) bytes: &'a [u8],
    pub(crate) file_offset: u64,
    pub(crate) generation: u64,
}

impl<'a> LineView<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Offset of the first byte of the line within the file.
    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    /// Mapping generation the line was read from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl Deref for LineView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl AsRef<[u8]> for LineView<'_> {
    fn as_ref(&self) -> &[u8] {
        self.bytes
    }
}

/// Detached handle to a line, checked against the window generation on resolve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineSpan {
    pub(crate) generation: u64,
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) file_offset: u64,
}

impl LineSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
