//! Row codec: the fixed layout used for every leaf value in a table's
//! B-tree (as opposed to an index's, which has no row payload at all).
//!
//! `4-byte LE total length | per-column (1-byte null flag, payload)`. The
//! leading length makes a row self-describing to the node layer
//! (`row_value_len`) without either side needing the table's schema.

use crate::types::{Value, ValueKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for v in &self.0 {
            body.push(if v.is_null() { 1 } else { 0 });
            v.encode(&mut body);
        }
        let mut out = (body.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }

    pub fn decode(kinds: &[ValueKind], buf: &[u8]) -> Row {
        let len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        let body = &buf[4..4 + len];
        let mut pos = 0;
        let mut values = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let is_null = body[pos] != 0;
            pos += 1;
            if is_null {
                values.push(Value::Null);
            } else {
                values.push(Value::decode(kind, body, &mut pos));
            }
        }
        Row(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_columns_with_nulls() {
        let row = Row(vec![Value::Int(7), Value::Null, Value::Text("hi".into())]);
        let kinds = [ValueKind::Int, ValueKind::Bool, ValueKind::Text];
        let bytes = row.encode();
        let back = Row::decode(&kinds, &bytes);
        assert_eq!(row, back);
    }
}
