use std::collections::BTreeMap;

use bytes::Bytes;

use super::*;

#[test]
fn decode_integer() {
    assert_eq!(decode(b"i42e").unwrap(), Value::Integer(42));
    assert_eq!(decode(b"i-42e").unwrap(), Value::Integer(-42));
    assert_eq!(decode(b"i0e").unwrap(), Value::Integer(0));
}

#[test]
fn decode_integer_invalid() {
    assert!(decode(b"i-0e").is_err());
    assert!(decode(b"i03e").is_err());
    assert!(decode(b"ie").is_err());
    assert!(decode(b"i-e").is_err());
    assert!(decode(b"i+42e").is_err());
    assert!(decode(b"i4 2e").is_err());
}

#[test]
fn decode_bytes() {
    assert_eq!(
        decode(b"4:spam").unwrap(),
        Value::Bytes(Bytes::from_static(b"spam"))
    );
    assert_eq!(decode(b"0:").unwrap(), Value::Bytes(Bytes::from_static(b"")));
}

#[test]
fn decode_bytes_invalid_length() {
    assert!(decode(b"04:spam").is_err());
    assert!(decode(b"4spam").is_err());
    assert!(decode(b"9:spam").is_err());
}

#[test]
fn decode_list() {
    let result = decode(b"l4:spami42ee").unwrap();
    match result {
        Value::List(l) => {
            assert_eq!(l.len(), 2);
            assert_eq!(l[0], Value::Bytes(Bytes::from_static(b"spam")));
            assert_eq!(l[1], Value::Integer(42));
        }
        _ => panic!("expected list"),
    }
}

#[test]
fn decode_dict() {
    let result = decode(b"d3:cow3:moo4:spam4:eggse").unwrap();
    match result {
        Value::Dict(d) => {
            assert_eq!(d.len(), 2);
            assert_eq!(
                d.get(&Bytes::from_static(b"cow")),
                Some(&Value::Bytes(Bytes::from_static(b"moo")))
            );
        }
        _ => panic!("expected dict"),
    }
}

#[test]
fn decode_dict_unsorted_keys() {
    assert!(matches!(
        decode(b"d4:spam4:eggs3:cow3:mooe"),
        Err(BencodeError::UnsortedKeys)
    ));
}

#[test]
fn decode_dict_duplicate_keys() {
    assert!(matches!(
        decode(b"d3:cow3:moo3:cow4:mooee"),
        Err(BencodeError::UnsortedKeys)
    ));
}

#[test]
fn decode_dict_non_string_key() {
    assert!(decode(b"di1e3:mooe").is_err());
}

#[test]
fn decode_truncated() {
    assert!(matches!(decode(b""), Err(BencodeError::UnexpectedEof)));
    assert!(matches!(decode(b"l4:spam"), Err(BencodeError::UnexpectedEof)));
    assert!(matches!(decode(b"d3:cow"), Err(BencodeError::UnexpectedEof)));
    assert!(matches!(decode(b"5:spam"), Err(BencodeError::UnexpectedEof)));
}

#[test]
fn decode_unknown_tag() {
    assert!(matches!(
        decode(b"x42e"),
        Err(BencodeError::UnexpectedChar('x'))
    ));
}

#[test]
fn decode_trailing_data() {
    assert!(matches!(
        decode(b"i42eextra"),
        Err(BencodeError::TrailingData)
    ));
}

#[test]
fn decode_nesting_limit() {
    let mut deep = Vec::new();
    deep.extend(std::iter::repeat(b'l').take(100));
    deep.extend(std::iter::repeat(b'e').take(100));
    assert!(matches!(
        decode(&deep),
        Err(BencodeError::NestingTooDeep)
    ));
}

#[test]
fn encode_integer() {
    assert_eq!(encode(&Value::Integer(42)), b"i42e");
    assert_eq!(encode(&Value::Integer(-42)), b"i-42e");
    assert_eq!(encode(&Value::Integer(0)), b"i0e");
}

#[test]
fn encode_bytes() {
    assert_eq!(encode(&Value::Bytes(Bytes::from_static(b"spam"))), b"4:spam");
}

#[test]
fn encode_list() {
    let list = Value::List(vec![
        Value::Bytes(Bytes::from_static(b"spam")),
        Value::Integer(42),
    ]);
    assert_eq!(encode(&list), b"l4:spami42ee");
}

#[test]
fn encode_dict_sorts_keys() {
    let mut dict = BTreeMap::new();
    dict.insert(Bytes::from_static(b"spam"), Value::string("eggs"));
    dict.insert(Bytes::from_static(b"cow"), Value::string("moo"));
    assert_eq!(encode(&Value::Dict(dict)), b"d3:cow3:moo4:spam4:eggse");
}

#[test]
fn roundtrip_canonical() {
    let original: &[u8] = b"d8:announce15:http://test.com4:infod4:name4:test12:piece lengthi16384eee";
    let decoded = decode(original).unwrap();
    assert_eq!(encode(&decoded), original);
}

#[test]
fn roundtrip_value() {
    let mut dict = BTreeMap::new();
    dict.insert(Bytes::from_static(b"id"), Value::Bytes(Bytes::from(vec![0xAB; 20])));
    dict.insert(Bytes::from_static(b"n"), Value::Integer(-7));
    let value = Value::List(vec![Value::Dict(dict), Value::string(""), Value::Integer(0)]);

    assert_eq!(decode(&encode(&value)).unwrap(), value);
}

#[test]
fn nested_structures() {
    let data: &[u8] = b"d4:listl4:spami42eee";
    let decoded = decode(data).unwrap();
    assert_eq!(encode(&decoded), data);
}

#[test]
fn value_accessors() {
    let value = Value::Integer(42);
    assert_eq!(value.as_integer(), Some(42));
    assert!(value.as_bytes().is_none());

    let value = Value::string("test");
    assert_eq!(value.as_str(), Some("test"));
    assert!(value.as_integer().is_none());

    let value = Value::List(vec![Value::Integer(1)]);
    assert!(value.as_list().is_some());
    assert!(value.as_dict().is_none());
    assert_eq!(value.get(b"anything"), None);

    let value = Value::Bytes(Bytes::from_static(b"\xFF\xFE"));
    assert!(value.as_str().is_none());
    assert!(value.as_bytes().is_some());

    let value = Value::Dict(BTreeMap::new());
    assert!(value.as_dict().is_some());
    assert_eq!(value.get(b"anything"), None);
}

#[test]
fn dict_field_accessors() {
    let value = decode(b"d2:id2:ab4:porti42e1:y1:qe").unwrap();

    assert_eq!(value.get_str(b"y"), Some("q"));
    assert_eq!(
        value.get_bytes(b"id").map(|b| b.as_ref()),
        Some(b"ab".as_slice())
    );
    assert_eq!(value.get(b"port").and_then(Value::as_integer), Some(42));

    // Shape mismatches and absent keys read as missing.
    assert_eq!(value.get_str(b"port"), None);
    assert_eq!(value.get_bytes(b"missing"), None);
    assert_eq!(Value::Integer(1).get_str(b"y"), None);
}
