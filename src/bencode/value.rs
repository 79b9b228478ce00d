use bytes::Bytes;
use std::collections::BTreeMap;

/// A bencode value.
///
/// Bencode has four data types: integers, byte strings, lists, and
/// dictionaries. Dictionary keys are byte strings; keeping them in a
/// [`BTreeMap`] means the canonical (sorted, duplicate-free) key order of
/// BEP-3 holds for every value this type can represent.
///
/// KRPC messages are dictionaries of mostly byte-string fields, so access
/// goes through shape-checked accessors: each returns `None` unless the
/// value has exactly the expected variant.
///
/// # Examples
///
/// ```
/// use dht_node::bencode::decode;
///
/// let ping = decode(b"d1:q4:ping1:t2:aa1:y1:qe").unwrap();
/// assert_eq!(ping.get_str(b"y"), Some("q"));
/// assert_eq!(ping.get_str(b"q"), Some("ping"));
/// assert_eq!(ping.get_bytes(b"t").map(|t| t.as_ref()), Some(b"aa".as_slice()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A signed 64-bit integer.
    Integer(i64),
    /// A byte string, not necessarily valid UTF-8.
    Bytes(Bytes),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A dictionary with byte-string keys, sorted by key.
    Dict(BTreeMap<Bytes, Value>),
}

impl Value {
    /// Creates a byte string value from a UTF-8 string.
    pub fn string(s: &str) -> Self {
        Value::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }

    /// Returns the value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        if let Value::Integer(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Returns the value as a byte string, if it is one.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        if let Value::Bytes(b) = self {
            Some(b)
        } else {
            None
        }
    }

    /// Returns the value as a UTF-8 string, if it is a byte string holding
    /// valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()?).ok()
    }

    /// Returns the value as a list, if it is one.
    pub fn as_list(&self) -> Option<&[Value]> {
        if let Value::List(l) = self {
            Some(l)
        } else {
            None
        }
    }

    /// Returns the value as a dictionary, if it is one.
    pub fn as_dict(&self) -> Option<&BTreeMap<Bytes, Value>> {
        if let Value::Dict(d) = self {
            Some(d)
        } else {
            None
        }
    }

    /// Looks up a key, when this value is a dictionary.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict()?.get(key)
    }

    /// Looks up a byte-string field, when this value is a dictionary.
    ///
    /// Most KRPC fields (`t`, `id`, `nodes`, `token`, `info_hash`) are byte
    /// strings; this combines the lookup with the shape check.
    pub fn get_bytes(&self, key: &[u8]) -> Option<&Bytes> {
        self.get(key)?.as_bytes()
    }

    /// Looks up a UTF-8 string field, when this value is a dictionary.
    pub fn get_str(&self, key: &[u8]) -> Option<&str> {
        self.get(key)?.as_str()
    }
}
