//! Leaf and index elements and their on-page encoding.
//!
//! Keys are stored as one byte holding `length - 1` followed by the key
//! bytes, so a stored key is between 1 and 256 bytes long. Keys order
//! lexicographically as unsigned bytes, which is `<[u8] as Ord>`.

#![allow(clippy::cast_possible_truncation)]

use crate::storage::{PAGE_INDEX_SIZE, PageError, PageIndex, PageReader, PageWriter};

fn write_key(writer: &mut PageWriter<'_>, key: &[u8]) -> Result<(), PageError> {
    if key.is_empty() || key.len() > 256 {
        return Err(PageError::Overflow {
            offset: writer.position(),
            len: key.len(),
        });
    }
    writer.write_u8((key.len() - 1) as u8)?;
    writer.write_bytes(key)
}

fn read_key(reader: &mut PageReader<'_>) -> Result<Vec<u8>, PageError> {
    let len = usize::from(reader.read_u8()?) + 1;
    Ok(reader.read_bytes(len)?.to_vec())
}

/// A key/value pair stored in a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataElement {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl DataElement {
    /// Encoded bytes besides the key and value: key length and value length.
    pub const HEADER_SIZE: usize = 1 + 2;

    #[must_use]
    pub const fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { key, value }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        Self::encoded_size(self.key.len(), self.value.len())
    }

    /// Encoded size of an element with the given key and value lengths.
    #[must_use]
    pub const fn encoded_size(key_len: usize, value_len: usize) -> usize {
        Self::HEADER_SIZE + key_len + value_len
    }

    pub(crate) fn write(&self, writer: &mut PageWriter<'_>) -> Result<(), PageError> {
        let value_len = u16::try_from(self.value.len()).map_err(|_| PageError::Overflow {
            offset: writer.position(),
            len: self.value.len(),
        })?;
        write_key(writer, &self.key)?;
        writer.write_u16(value_len)?;
        writer.write_bytes(&self.value)
    }

    pub(crate) fn read(reader: &mut PageReader<'_>) -> Result<Self, PageError> {
        let key = read_key(reader)?;
        let len = usize::from(reader.read_u16()?);
        let value = reader.read_bytes(len)?.to_vec();
        Ok(Self { key, value })
    }
}

/// A separator in an index page: the lowest key routed to `child`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexElement {
    pub key: Vec<u8>,
    pub child: PageIndex,
}

impl IndexElement {
    /// Encoded bytes besides the key: key length and child reference.
    pub const HEADER_SIZE: usize = 1 + PAGE_INDEX_SIZE;

    #[must_use]
    pub const fn new(key: Vec<u8>, child: PageIndex) -> Self {
        Self { key, child }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        Self::HEADER_SIZE + self.key.len()
    }

    pub(crate) fn write(&self, writer: &mut PageWriter<'_>) -> Result<(), PageError> {
        write_key(writer, &self.key)?;
        writer.write_page_index(self.child)
    }

    pub(crate) fn read(reader: &mut PageReader<'_>) -> Result<Self, PageError> {
        let key = read_key(reader)?;
        let child = reader.read_page_index()?;
        Ok(Self { key, child })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{PageBuffer, PageTag};

    #[test]
    fn test_data_element_layout() {
        let element = DataElement::new(b"ab".to_vec(), b"xyz".to_vec());
        assert_eq!(element.size(), 8);

        let mut page = PageBuffer::new(32);
        element
            .write(&mut page.writer(PageTag::Data))
            .expect("write");
        assert_eq!(&page.as_bytes()[..9], &[b'D', 1, b'a', b'b', 0, 3, b'x', b'y', b'z']);

        let mut reader = page.body();
        assert_eq!(DataElement::read(&mut reader).expect("read"), element);
        assert_eq!(reader.position(), 9);
    }

    #[test]
    fn test_index_element_layout() {
        let element = IndexElement::new(vec![0xFF; 256], 9);
        assert_eq!(element.size(), 262);

        let mut page = PageBuffer::new(300);
        element
            .write(&mut page.writer(PageTag::Index))
            .expect("write");
        assert_eq!(page.as_bytes()[1], 255);
        assert_eq!(&page.as_bytes()[257..262], &[0, 0, 0, 0, 9]);

        assert_eq!(IndexElement::read(&mut page.body()).expect("read"), element);
    }

    #[test]
    fn test_unencodable_keys_rejected() {
        let mut page = PageBuffer::new(600);
        let mut writer = page.writer(PageTag::Index);
        assert!(IndexElement::new(Vec::new(), 1).write(&mut writer).is_err());
        assert!(IndexElement::new(vec![1; 257], 1).write(&mut writer).is_err());
    }

    #[test]
    fn test_keys_order_as_unsigned_bytes() {
        assert!(b"a".as_slice() < b"ab".as_slice());
        assert!([0x7Fu8].as_slice() < [0x80u8].as_slice());
        assert!(b"b".as_slice() > b"abc".as_slice());
    }
}
