//! Cell encoding: the variable-length records stored in a node's cell area.
//!
//! A leaf cell is `key || value`; an inner cell is `child_id(4) || key`.
//! Both key and value are self-describing (fixed width for Int/Bool,
//! length-prefixed for Text and for row-record values), so no extra
//! length field is needed in the cell itself.

use crate::types::{KeyType, PageId};

#[derive(Debug, Clone)]
pub enum Cell {
    Inner { child: PageId, key: Vec<u8> },
    Leaf { key: Vec<u8>, value: Vec<u8> },
}

impl Cell {
    pub fn key(&self) -> &[u8] {
        match self {
            Cell::Inner { key, .. } => key,
            Cell::Leaf { key, .. } => key,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Cell::Inner { child, key } => {
                let mut out = Vec::with_capacity(4 + key.len());
                out.extend_from_slice(&child.value().to_le_bytes());
                out.extend_from_slice(key);
                out
            }
            Cell::Leaf { key, value } => {
                let mut out = Vec::with_capacity(key.len() + value.len());
                out.extend_from_slice(key);
                out.extend_from_slice(value);
                out
            }
        }
    }
}

/// Total encoded length of the cell starting at `buf`, without decoding it.
pub fn inner_cell_len(kt: &dyn KeyType, buf: &[u8]) -> usize {
    4 + kt.peek_len(&buf[4..])
}

pub fn leaf_cell_len(kt: &dyn KeyType, buf: &[u8]) -> usize {
    let key_len = kt.peek_len(buf);
    let value_len = row_value_len(&buf[key_len..]);
    key_len + value_len
}

/// Row-record values always begin with their own 4-byte LE total length.
pub fn row_value_len(buf: &[u8]) -> usize {
    4 + u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize
}

pub fn decode_inner(kt: &dyn KeyType, buf: &[u8]) -> Cell {
    let child = PageId::new(u32::from_le_bytes(buf[0..4].try_into().unwrap()));
    let key_len = kt.peek_len(&buf[4..]);
    Cell::Inner {
        child,
        key: buf[4..4 + key_len].to_vec(),
    }
}

pub fn decode_leaf(kt: &dyn KeyType, buf: &[u8]) -> Cell {
    let key_len = kt.peek_len(buf);
    let value_len = row_value_len(&buf[key_len..]);
    Cell::Leaf {
        key: buf[..key_len].to_vec(),
        value: buf[key_len..key_len + value_len].to_vec(),
    }
}
