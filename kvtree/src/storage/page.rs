//! Page buffers and the tag byte that identifies what a page holds.
//!
//! Every tree page starts with a one-byte tag. The remainder of the page is
//! interpreted by the page variant; multi-byte integers are big-endian and
//! page references use a 5-byte encoding.

/// A page identifier (0-indexed page number).
pub type PageIndex = u64;

/// The root page. Its identity never changes for the lifetime of a tree.
pub const ROOT_PAGE: PageIndex = 0;

/// Marker for "no page" in leaf chain links.
pub const NO_PAGE: PageIndex = 0;

/// Width of an encoded page reference in bytes.
pub const PAGE_INDEX_SIZE: usize = 5;

/// Largest page index representable in `PAGE_INDEX_SIZE` bytes.
pub const MAX_PAGE_INDEX: PageIndex = (1 << (8 * PAGE_INDEX_SIZE)) - 1;

/// Tag byte stored at offset 0 of every tree page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageTag {
    /// Internal routing page.
    Index = b'I',
    /// Leaf page holding key/value elements.
    Data = b'D',
    /// Retired page; never reachable and never re-addressed.
    Terminated = b'X',
}

impl TryFrom<u8> for PageTag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'I' => Ok(Self::Index),
            b'D' => Ok(Self::Data),
            b'X' => Ok(Self::Terminated),
            _ => Err(value),
        }
    }
}

/// A raw page buffer sized to the tree's page size.
#[derive(Clone, PartialEq, Eq)]
pub struct PageBuffer {
    data: Box<[u8]>,
}

impl PageBuffer {
    /// Create a new zeroed page.
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            data: vec![0u8; page_size].into_boxed_slice(),
        }
    }

    /// Create a zeroed page carrying only a tag byte.
    #[must_use]
    pub fn tagged(page_size: usize, tag: PageTag) -> Self {
        let mut page = Self::new(page_size);
        page.data[0] = tag as u8;
        page
    }

    /// Get the raw page data.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable access to the raw page data.
    pub const fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the page, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Box<[u8]> {
        self.data
    }

    /// The leading tag byte, undecoded.
    #[must_use]
    pub fn tag_byte(&self) -> u8 {
        self.data.first().copied().unwrap_or(0)
    }

    /// A reader positioned just after the tag byte.
    #[must_use]
    pub fn body(&self) -> PageReader<'_> {
        PageReader {
            data: &self.data,
            pos: 1,
        }
    }

    /// A writer that starts by stamping `tag` at offset 0.
    pub fn writer(&mut self, tag: PageTag) -> PageWriter<'_> {
        self.data.fill(0);
        self.data[0] = tag as u8;
        PageWriter {
            data: &mut self.data,
            pos: 1,
        }
    }
}

impl From<Box<[u8]>> for PageBuffer {
    fn from(data: Box<[u8]>) -> Self {
        Self { data }
    }
}

impl std::fmt::Debug for PageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let head = &self.data[..self.data.len().min(16)];
        f.debug_struct("PageBuffer")
            .field("len", &self.data.len())
            .field("first_16_bytes", &head)
            .finish_non_exhaustive()
    }
}

/// Sequential, bounds-checked reader over a page body.
#[derive(Debug)]
pub struct PageReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PageReader<'a> {
    /// Current offset within the page.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Read `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], PageError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(PageError::Truncated {
                offset: self.pos,
                len,
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, PageError> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a big-endian u16.
    pub fn read_u16(&mut self) -> Result<u16, PageError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a 5-byte big-endian page reference.
    pub fn read_page_index(&mut self) -> Result<PageIndex, PageError> {
        let bytes = self.read_bytes(PAGE_INDEX_SIZE)?;
        Ok(bytes
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | PageIndex::from(b)))
    }
}

/// Sequential, bounds-checked writer over a page body.
#[derive(Debug)]
pub struct PageWriter<'a> {
    data: &'a mut [u8],
    pos: usize,
}

impl PageWriter<'_> {
    /// Current offset within the page.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), PageError> {
        let end = self
            .pos
            .checked_add(bytes.len())
            .filter(|&end| end <= self.data.len())
            .ok_or(PageError::Overflow {
                offset: self.pos,
                len: bytes.len(),
            })?;
        self.data[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<(), PageError> {
        self.write_bytes(&[value])
    }

    /// Write a big-endian u16.
    pub fn write_u16(&mut self, value: u16) -> Result<(), PageError> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Write a 5-byte big-endian page reference.
    pub fn write_page_index(&mut self, value: PageIndex) -> Result<(), PageError> {
        if value > MAX_PAGE_INDEX {
            return Err(PageError::IndexOutOfRange(value));
        }
        let bytes = value.to_be_bytes();
        self.write_bytes(&bytes[bytes.len() - PAGE_INDEX_SIZE..])
    }
}

/// Errors related to page encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// A read ran past the end of the page.
    Truncated { offset: usize, len: usize },
    /// A write ran past the end of the page.
    Overflow { offset: usize, len: usize },
    /// A page index does not fit the 5-byte encoding.
    IndexOutOfRange(PageIndex),
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { offset, len } => {
                write!(f, "read of {len} bytes at offset {offset} runs past page end")
            }
            Self::Overflow { offset, len } => {
                write!(f, "write of {len} bytes at offset {offset} runs past page end")
            }
            Self::IndexOutOfRange(index) => {
                write!(f, "page index {index} exceeds {PAGE_INDEX_SIZE}-byte encoding")
            }
        }
    }
}

impl std::error::Error for PageError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_tag_conversion() {
        assert_eq!(PageTag::try_from(b'I'), Ok(PageTag::Index));
        assert_eq!(PageTag::try_from(b'D'), Ok(PageTag::Data));
        assert_eq!(PageTag::try_from(b'X'), Ok(PageTag::Terminated));
        assert_eq!(PageTag::try_from(0), Err(0));
    }

    #[test]
    fn test_page_index_is_five_bytes_big_endian() {
        let mut page = PageBuffer::new(64);
        {
            let mut writer = page.writer(PageTag::Data);
            writer.write_page_index(0x01_0203_0405).expect("write");
            assert_eq!(writer.position(), 1 + PAGE_INDEX_SIZE);
        }
        assert_eq!(&page.as_bytes()[..6], &[b'D', 1, 2, 3, 4, 5]);

        let mut reader = page.body();
        assert_eq!(reader.read_page_index().expect("read"), 0x01_0203_0405);
    }

    #[test]
    fn test_page_index_out_of_range() {
        let mut page = PageBuffer::new(64);
        let mut writer = page.writer(PageTag::Index);
        assert_eq!(
            writer.write_page_index(MAX_PAGE_INDEX + 1),
            Err(PageError::IndexOutOfRange(MAX_PAGE_INDEX + 1))
        );
    }

    #[test]
    fn test_reader_rejects_truncated_reads() {
        let page = PageBuffer::new(8);
        let mut reader = page.body();
        reader.read_bytes(7).expect("fits");
        assert!(matches!(
            reader.read_u8(),
            Err(PageError::Truncated { offset: 8, len: 1 })
        ));
    }

    #[test]
    fn test_writer_clears_previous_contents() {
        let mut page = PageBuffer::new(16);
        page.as_bytes_mut().fill(0xAB);
        {
            let mut writer = page.writer(PageTag::Terminated);
            writer.write_u16(0x0102).expect("write");
        }
        assert_eq!(page.tag_byte(), b'X');
        assert_eq!(&page.as_bytes()[1..3], &[1, 2]);
        assert!(page.as_bytes()[3..].iter().all(|&b| b == 0));
    }
}
