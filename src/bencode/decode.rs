use std::collections::BTreeMap;

use bytes::Bytes;

use super::error::BencodeError;
use super::value::Value;

const MAX_DEPTH: usize = 64;

/// Decodes a single bencode value from a byte slice.
///
/// The input must contain exactly one complete value with no trailing data.
/// Decoding is strict: integers with a `+` sign, leading zeros, or `-0`,
/// length prefixes with leading zeros, and dictionaries whose keys are not
/// in strictly ascending byte order are all rejected rather than silently
/// normalized.
///
/// # Errors
///
/// Returns an error if:
/// - the input is empty or truncated ([`BencodeError::UnexpectedEof`])
/// - the input contains invalid bencode syntax
/// - dictionary keys are out of order or duplicated ([`BencodeError::UnsortedKeys`])
/// - the nesting depth exceeds 64 levels ([`BencodeError::NestingTooDeep`])
/// - there is data after the value ([`BencodeError::TrailingData`])
///
/// # Examples
///
/// ```
/// use dht_node::bencode::decode;
///
/// let int = decode(b"i42e").unwrap();
/// assert_eq!(int.as_integer(), Some(42));
///
/// let string = decode(b"5:hello").unwrap();
/// assert_eq!(string.as_str(), Some("hello"));
///
/// let dict = decode(b"d3:agei30e4:name5:Alicee").unwrap();
/// assert_eq!(dict.get_str(b"name"), Some("Alice"));
/// ```
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let mut decoder = Decoder { data, pos: 0 };
    let value = decoder.value(0)?;

    if decoder.pos != data.len() {
        return Err(BencodeError::TrailingData);
    }

    Ok(value)
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Decoder<'_> {
    fn peek(&self) -> Result<u8, BencodeError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(BencodeError::UnexpectedEof)
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn value(&mut self, depth: usize) -> Result<Value, BencodeError> {
        if depth > MAX_DEPTH {
            return Err(BencodeError::NestingTooDeep);
        }

        match self.peek()? {
            b'i' => self.integer(),
            b'l' => self.list(depth),
            b'd' => self.dict(depth),
            b'0'..=b'9' => Ok(Value::Bytes(self.byte_string()?)),
            c => Err(BencodeError::UnexpectedChar(c as char)),
        }
    }

    fn integer(&mut self) -> Result<Value, BencodeError> {
        self.bump();

        let start = self.pos;
        if self.peek()? == b'-' {
            self.bump();
        }

        while self.peek()? != b'e' {
            if !self.data[self.pos].is_ascii_digit() {
                return Err(BencodeError::InvalidInteger(
                    String::from_utf8_lossy(&self.data[start..=self.pos]).into_owned(),
                ));
            }
            self.bump();
        }

        let digits = &self.data[start..self.pos];
        self.bump();

        let text = std::str::from_utf8(digits)
            .map_err(|_| BencodeError::InvalidInteger("invalid utf8".into()))?;

        if text.is_empty() || text == "-" {
            return Err(BencodeError::InvalidInteger("empty".into()));
        }
        if text.starts_with("-0") || (text.starts_with('0') && text.len() > 1) {
            return Err(BencodeError::InvalidInteger(text.into()));
        }

        let value: i64 = text
            .parse()
            .map_err(|_| BencodeError::InvalidInteger(text.into()))?;

        Ok(Value::Integer(value))
    }

    fn byte_string(&mut self) -> Result<Bytes, BencodeError> {
        let start = self.pos;
        while self.peek()? != b':' {
            if !self.data[self.pos].is_ascii_digit() {
                return Err(BencodeError::InvalidStringLength);
            }
            self.bump();
        }

        let digits = &self.data[start..self.pos];
        self.bump();

        if digits.is_empty() || (digits[0] == b'0' && digits.len() > 1) {
            return Err(BencodeError::InvalidStringLength);
        }

        let len: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(BencodeError::InvalidStringLength)?;

        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(BencodeError::UnexpectedEof)?;

        let bytes = Bytes::copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;

        Ok(bytes)
    }

    fn list(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.bump();
        let mut list = Vec::new();

        while self.peek()? != b'e' {
            list.push(self.value(depth + 1)?);
        }

        self.bump();
        Ok(Value::List(list))
    }

    fn dict(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.bump();
        let mut dict = BTreeMap::new();
        let mut last_key: Option<Bytes> = None;

        while self.peek()? != b'e' {
            if !self.data[self.pos].is_ascii_digit() {
                return Err(BencodeError::UnexpectedChar(self.data[self.pos] as char));
            }
            let key = self.byte_string()?;

            // Canonical bencode orders keys strictly ascending; equal keys
            // are duplicates and also rejected.
            if let Some(prev) = &last_key {
                if key <= *prev {
                    return Err(BencodeError::UnsortedKeys);
                }
            }
            last_key = Some(key.clone());

            let value = self.value(depth + 1)?;
            dict.insert(key, value);
        }

        self.bump();
        Ok(Value::Dict(dict))
    }
}
