//! Scatter/gather descriptions
//!
//! A chunk is described either by one direct segment (the request touches a
//! single page) or by one segment per page, capped at `max_segments`.

use crate::store::PageRef;

/// Which way bytes flow during a data move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device → host (read)
    ToHost,

    /// Host → device (write, compare staging)
    FromHost,
}

#[derive(Debug)]
enum SegmentBuf {
    /// Window into a page (or the zero page)
    Page { page: PageRef, offset: usize },

    /// Owned buffer that only lives for one chunk (compare staging)
    Staging(Vec<u8>),
}

/// One contiguous memory range of a chunk
#[derive(Debug)]
pub struct Segment {
    buf: SegmentBuf,
    len: usize,
}

impl Segment {
    /// `len` bytes of `page` starting at `offset`
    pub fn page(page: PageRef, offset: usize, len: usize) -> Self {
        Self {
            buf: SegmentBuf::Page { page, offset },
            len,
        }
    }

    /// A zeroed owned buffer of `len` bytes
    pub fn staging(len: usize) -> Self {
        Self {
            buf: SegmentBuf::Staging(vec![0; len]),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Backing page reference, if this segment maps a page
    pub fn page_ref(&self) -> Option<&PageRef> {
        match &self.buf {
            SegmentBuf::Page { page, .. } => Some(page),
            SegmentBuf::Staging(_) => None,
        }
    }

    /// Bytes held by a staging segment
    pub fn staged(&self) -> Option<&[u8]> {
        match &self.buf {
            SegmentBuf::Staging(bytes) => Some(bytes),
            SegmentBuf::Page { .. } => None,
        }
    }

    /// Copy the segment contents into `dst` (`dst.len() == self.len()`)
    pub fn copy_out(&self, dst: &mut [u8]) {
        match &self.buf {
            SegmentBuf::Page { page, offset } => page.copy_out(*offset, dst),
            SegmentBuf::Staging(bytes) => dst.copy_from_slice(bytes),
        }
    }

    /// Fill the segment from `src` (`src.len() == self.len()`)
    pub fn copy_in(&mut self, src: &[u8]) {
        match &mut self.buf {
            SegmentBuf::Page { page, offset } => page.copy_in(*offset, src),
            SegmentBuf::Staging(bytes) => bytes.copy_from_slice(src),
        }
    }
}

/// Memory description of one chunk
#[derive(Debug)]
pub enum ChunkData {
    /// Single page touched: a zero-copy view into it
    Direct(Segment),

    /// One segment per page
    Scatter(Vec<Segment>),
}

impl ChunkData {
    pub fn segments(&self) -> &[Segment] {
        match self {
            ChunkData::Direct(segment) => std::slice::from_ref(segment),
            ChunkData::Scatter(segments) => segments,
        }
    }

    pub fn segments_mut(&mut self) -> &mut [Segment] {
        match self {
            ChunkData::Direct(segment) => std::slice::from_mut(segment),
            ChunkData::Scatter(segments) => segments,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, ChunkData::Direct(_))
    }
}

impl From<Vec<Segment>> for ChunkData {
    fn from(mut segments: Vec<Segment>) -> Self {
        if segments.len() == 1 {
            if let Some(segment) = segments.pop() {
                return ChunkData::Direct(segment);
            }
        }
        ChunkData::Scatter(segments)
    }
}

/// One bounded sub-transfer of a request
#[derive(Debug)]
pub struct Chunk {
    /// First block of the chunk
    pub lba: u64,

    /// Blocks covered
    pub blocks: u64,

    /// Byte offset of the chunk within the host buffer
    pub host_offset: usize,

    pub direction: Direction,

    pub data: ChunkData,
}

impl Chunk {
    /// Total bytes described
    pub fn len(&self) -> usize {
        self.data.segments().iter().map(Segment::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn segment_count(&self) -> usize {
        self.data.segments().len()
    }
}
