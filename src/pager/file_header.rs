//! The 64-byte file header occupying page 0.

use crate::error::{PagerError, Result};
use crate::types::{FILE_HEADER_MAGIC, FILE_HEADER_SIZE, PAGE_SIZE};

#[derive(Debug, Clone)]
pub struct FileHeader {
    pub page_size: u16,
    /// Head of the free-page list, 0 meaning "no free pages".
    pub free_list_head: u32,
}

impl FileHeader {
    pub fn new() -> Self {
        Self {
            page_size: PAGE_SIZE as u16,
            free_list_head: 0,
        }
    }

    pub fn read(buf: &[u8]) -> Result<Self> {
        if buf.len() < FILE_HEADER_SIZE {
            return Err(PagerError::Corruption("file header truncated".into()).into());
        }
        if &buf[0..19] != FILE_HEADER_MAGIC.as_slice() {
            return Err(PagerError::Corruption("bad file header magic".into()).into());
        }
        let page_size = u16::from_le_bytes(buf[19..21].try_into().unwrap());
        let free_list_head = u32::from_le_bytes(buf[21..25].try_into().unwrap());
        Ok(Self {
            page_size,
            free_list_head,
        })
    }

    pub fn write(&self, buf: &mut [u8]) {
        buf[..FILE_HEADER_SIZE].fill(0);
        buf[0..19].copy_from_slice(FILE_HEADER_MAGIC.as_slice());
        buf[19..21].copy_from_slice(&self.page_size.to_le_bytes());
        buf[21..25].copy_from_slice(&self.free_list_head.to_le_bytes());
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let h = FileHeader {
            page_size: 8192,
            free_list_head: 7,
        };
        let mut buf = vec![0u8; FILE_HEADER_SIZE];
        h.write(&mut buf);
        let back = FileHeader::read(&buf).unwrap();
        assert_eq!(back.page_size, 8192);
        assert_eq!(back.free_list_head, 7);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; FILE_HEADER_SIZE];
        assert!(FileHeader::read(&buf).is_err());
    }
}
