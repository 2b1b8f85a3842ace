use std::io::{Result, Write};

use crate::bencoding::value::Value;
use crate::codec::Encoder;

impl Encoder for Value {
    fn encode(&self, out: &mut impl Write) -> Result<()> {
        match self {
            Self::Integer(integer) => write!(out, "i{}e", integer),
            Self::String(bytes) => write_bytes(out, bytes),
            Self::List(values) => write_container(out, b'l', |out| {
                values.iter().try_for_each(|value| value.encode(out))
            }),
            Self::Dictionary(entries) => write_container(out, b'd', |out| {
                entries.iter().try_for_each(|(key, value)| {
                    write_bytes(out, key.as_bytes())?;
                    value.encode(out)
                })
            }),
        }
    }
}

impl Value {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        // Writing to a Vec never fails
        let _ = self.encode(&mut bytes);
        bytes
    }
}

fn write_bytes<W: Write>(out: &mut W, bytes: &[u8]) -> Result<()> {
    write!(out, "{}:", bytes.len())?;
    out.write_all(bytes)
}

fn write_container<W: Write>(
    out: &mut W,
    tag: u8,
    items: impl FnOnce(&mut W) -> Result<()>,
) -> Result<()> {
    out.write_all(&[tag])?;
    items(out)?;
    out.write_all(b"e")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers() {
        assert_eq!(Value::Integer(42).to_bytes(), b"i42e");
        assert_eq!(Value::Integer(0).to_bytes(), b"i0e");
        assert_eq!(Value::Integer(-7).to_bytes(), b"i-7e");
    }

    #[test]
    fn binary_strings() {
        assert_eq!(Value::string("foo").to_bytes(), b"3:foo");
        assert_eq!(Value::string([0u8, 0xff]).to_bytes(), b"2:\x00\xff");
        assert_eq!(Value::string("").to_bytes(), b"0:");
    }

    #[test]
    fn nested_list() {
        let value = Value::list()
            .with_value(Value::string("foo"))
            .with_value(Value::list().with_value(Value::Integer(1)));

        assert_eq!(value.to_bytes(), b"l3:fooli1eee");
    }

    #[test]
    fn dictionary_keys_are_sorted() {
        let value = Value::dictionary()
            .with_entry("foo", Value::Integer(1))
            .with_entry("bar", Value::Integer(2));

        assert_eq!(value.to_bytes(), b"d3:bari2e3:fooi1ee");
    }

    #[test]
    fn encode_to_writer() {
        let mut out = Vec::new();
        Value::dictionary().encode(&mut out).unwrap();

        assert_eq!(out, b"de");
    }
}
