use std::collections::BTreeMap;

use anyhow::{Error, Result, anyhow};

/// A bencoded value. Byte strings are kept as raw bytes since they are not required to be valid
/// UTF-8, dictionary keys are.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Value {
    String(Vec<u8>),
    Integer(i64),
    List(Vec<Value>),
    Dictionary(BTreeMap<String, Value>),
}

impl Value {
    pub fn string(bytes: impl AsRef<[u8]>) -> Self {
        Self::String(bytes.as_ref().to_vec())
    }

    pub fn list() -> Self {
        Self::List(Vec::new())
    }

    pub fn dictionary() -> Self {
        Self::Dictionary(BTreeMap::new())
    }

    pub fn with_value(mut self, value: Value) -> Self {
        if let Self::List(values) = &mut self {
            values.push(value);
        }
        self
    }

    pub fn with_entry(mut self, key: &str, value: Value) -> Self {
        if let Self::Dictionary(entries) = &mut self {
            entries.insert(key.to_string(), value);
        }
        self
    }

    pub fn remove_entry(&mut self, key: &str) -> Result<Value> {
        self.try_remove_entry(key)?
            .ok_or_else(|| anyhow!("missing entry: {}", key))
    }

    pub fn try_remove_entry(&mut self, key: &str) -> Result<Option<Value>> {
        match self {
            Self::Dictionary(entries) => Ok(entries.remove(key)),
            other => Err(anyhow!("not a dictionary: {:?}", other)),
        }
    }
}

impl From<i64> for Value {
    fn from(integer: i64) -> Self {
        Self::Integer(integer)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Self::String(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::List(values)
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Integer(integer) => Ok(integer),
            other => Err(anyhow!("not an integer: {:?}", other)),
        }
    }
}

impl TryFrom<Value> for u64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let integer = i64::try_from(value)?;
        Ok(u64::try_from(integer)?)
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(bytes) => Ok(bytes),
            other => Err(anyhow!("not a string: {:?}", other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let bytes = Vec::<u8>::try_from(value)?;
        Ok(String::from_utf8(bytes)?)
    }
}

impl TryFrom<Value> for Vec<Value> {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::List(values) => Ok(values),
            other => Err(anyhow!("not a list: {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_entries() {
        let mut value = Value::dictionary()
            .with_entry("size", Value::Integer(42))
            .with_entry("name", Value::string("foo"));

        let size: u64 = value.remove_entry("size").unwrap().try_into().unwrap();
        let name: String = value.remove_entry("name").unwrap().try_into().unwrap();

        assert_eq!(size, 42);
        assert_eq!(name, "foo");
        assert!(value.remove_entry("size").is_err());
        assert_eq!(value.try_remove_entry("name").unwrap(), None);
        assert_eq!(value, Value::dictionary());
    }

    #[test]
    fn remove_entry_of_non_dictionary() {
        assert!(Value::list().remove_entry("foo").is_err());
    }

    #[test]
    fn conversion_errors() {
        assert!(u64::try_from(Value::Integer(-1)).is_err());
        assert!(i64::try_from(Value::string("1")).is_err());
        assert!(String::try_from(Value::string([0xff, 0xfe])).is_err());
        assert!(Vec::<Value>::try_from(Value::dictionary()).is_err());
    }
}
