use super::value::Value;

/// Encodes a bencode value to its canonical byte representation.
///
/// Dictionary keys are emitted in ascending byte order; the [`Value`]
/// representation makes unsorted or duplicate keys unrepresentable, so
/// encoding cannot fail.
///
/// # Examples
///
/// ```
/// use dht_node::bencode::{encode, Value};
///
/// assert_eq!(encode(&Value::Integer(42)), b"i42e");
/// assert_eq!(encode(&Value::string("spam")), b"4:spam");
/// ```
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value(value, &mut buf);
    buf
}

fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Integer(i) => {
            buf.push(b'i');
            buf.extend_from_slice(i.to_string().as_bytes());
            buf.push(b'e');
        }
        Value::Bytes(b) => {
            buf.extend_from_slice(b.len().to_string().as_bytes());
            buf.push(b':');
            buf.extend_from_slice(b);
        }
        Value::List(l) => {
            buf.push(b'l');
            for item in l {
                encode_value(item, buf);
            }
            buf.push(b'e');
        }
        Value::Dict(d) => {
            buf.push(b'd');
            for (key, val) in d {
                buf.extend_from_slice(key.len().to_string().as_bytes());
                buf.push(b':');
                buf.extend_from_slice(key);
                encode_value(val, buf);
            }
            buf.push(b'e');
        }
    }
}
