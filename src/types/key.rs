//! The pluggable key-type abstraction used by every B-tree.
//!
//! Each table's primary key is one of a small, closed set of scalar types.
//! `KeyType` is the handle the node and cursor layers use to compare,
//! size, and serialize keys without knowing which concrete type they are.

use std::cmp::Ordering;

/// The three scalar kinds a key (or column) can take on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Bool,
    Text,
}

/// A typed, in-memory value. `Value::Null` is valid for columns but never
/// for a primary key (primary keys are declared `NOT NULL` implicitly).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Int(i64),
    Bool(bool),
    Text(String),
}

impl Value {
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(ValueKind::Int),
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Text(_) => Some(ValueKind::Text),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Serialize the raw payload (no null flag, no length prefix for Int/Bool).
    /// Text is prefixed with its own 4-byte LE length, per the row codec.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Value::Null => {}
            Value::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Bool(b) => out.push(if *b { 1 } else { 0 }),
            Value::Text(s) => {
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
        }
    }

    /// Decode a non-null value of `kind` starting at `buf[pos]`, advancing `pos`.
    pub fn decode(kind: ValueKind, buf: &[u8], pos: &mut usize) -> Value {
        match kind {
            ValueKind::Int => {
                let bytes: [u8; 8] = buf[*pos..*pos + 8].try_into().unwrap();
                *pos += 8;
                Value::Int(i64::from_le_bytes(bytes))
            }
            ValueKind::Bool => {
                let v = buf[*pos] != 0;
                *pos += 1;
                Value::Bool(v)
            }
            ValueKind::Text => {
                let len = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap()) as usize;
                *pos += 4;
                let s = String::from_utf8_lossy(&buf[*pos..*pos + len]).into_owned();
                *pos += len;
                Value::Text(s)
            }
        }
    }

    /// Ordering used by the sorter and by `=`/comparison operators. Only
    /// meaningful between values of the same kind; mixed-kind comparisons
    /// are rejected earlier, by the type checker.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => compare_text(a.as_bytes(), b.as_bytes()),
            _ => Ordering::Equal,
        }
    }
}

/// Lexicographic order over the shared prefix, with length as the final
/// tiebreaker so that distinct keys never compare equal (one of them being
/// a strict prefix of the other no longer collapses the ordering).
pub fn compare_text(a: &[u8], b: &[u8]) -> Ordering {
    let n = a.len().min(b.len());
    match a[..n].cmp(&b[..n]) {
        Ordering::Equal => a.len().cmp(&b.len()),
        other => other,
    }
}

/// Per-key-type operations the node and cursor layers need without caring
/// which concrete scalar type backs a given table's primary key.
pub trait KeyType {
    /// Compare two already-serialized keys.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Serialized size of a key, in bytes. Int and Bool are fixed-size;
    /// Text includes its own 4-byte length prefix.
    fn sizeof_key(&self, key: &[u8]) -> usize {
        key.len()
    }

    /// How many bytes a key occupies starting at `buf[0]`, without needing
    /// the rest of the cell. Int/Bool are fixed width; Text reads its own
    /// leading 4-byte length prefix.
    fn peek_len(&self, buf: &[u8]) -> usize;

    /// Serialize an unresolved, typed key into its on-disk byte form.
    fn serialize(&self, value: &Value, out: &mut Vec<u8>);

    fn kind(&self) -> ValueKind;
}

pub struct IntKey;
pub struct BoolKey;
pub struct TextKey;

impl KeyType for IntKey {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let a = i64::from_le_bytes(a.try_into().unwrap());
        let b = i64::from_le_bytes(b.try_into().unwrap());
        a.cmp(&b)
    }
    fn peek_len(&self, _buf: &[u8]) -> usize {
        8
    }
    fn serialize(&self, value: &Value, out: &mut Vec<u8>) {
        if let Value::Int(v) = value {
            out.extend_from_slice(&v.to_le_bytes());
        } else {
            panic!("IntKey::serialize called with non-int value");
        }
    }
    fn kind(&self) -> ValueKind {
        ValueKind::Int
    }
}

impl KeyType for BoolKey {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a[0].cmp(&b[0])
    }
    fn peek_len(&self, _buf: &[u8]) -> usize {
        1
    }
    fn serialize(&self, value: &Value, out: &mut Vec<u8>) {
        if let Value::Bool(v) = value {
            out.push(if *v { 1 } else { 0 });
        } else {
            panic!("BoolKey::serialize called with non-bool value");
        }
    }
    fn kind(&self) -> ValueKind {
        ValueKind::Bool
    }
}

impl KeyType for TextKey {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        // Keys on disk carry their own 4-byte length prefix; compare the payloads.
        let a = &a[4..];
        let b = &b[4..];
        compare_text(a, b)
    }
    fn sizeof_key(&self, key: &[u8]) -> usize {
        key.len()
    }
    fn peek_len(&self, buf: &[u8]) -> usize {
        4 + u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize
    }
    fn serialize(&self, value: &Value, out: &mut Vec<u8>) {
        if let Value::Text(s) = value {
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        } else {
            panic!("TextKey::serialize called with non-text value");
        }
    }
    fn kind(&self) -> ValueKind {
        ValueKind::Text
    }
}

/// Resolve the `KeyType` handle for a given scalar kind.
pub fn key_type_for(kind: ValueKind) -> Box<dyn KeyType + Send + Sync> {
    match kind {
        ValueKind::Int => Box::new(IntKey),
        ValueKind::Bool => Box::new(BoolKey),
        ValueKind::Text => Box::new(TextKey),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_prefix_ties_break_by_length() {
        assert_eq!(compare_text(b"ab", b"abc"), Ordering::Less);
        assert_eq!(compare_text(b"abc", b"ab"), Ordering::Greater);
        assert_eq!(compare_text(b"abc", b"abc"), Ordering::Equal);
    }

    #[test]
    fn int_key_round_trips_through_serialize_and_compare() {
        let kt = IntKey;
        let mut a = Vec::new();
        let mut b = Vec::new();
        kt.serialize(&Value::Int(5), &mut a);
        kt.serialize(&Value::Int(10), &mut b);
        assert_eq!(kt.compare(&a, &b), Ordering::Less);
    }
}
