use std::{
    collections::BTreeMap,
    io::{Error, ErrorKind, Result},
};

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;

use crate::bencoding::value::Value;
use crate::codec::AsyncDecoder;

const BUFFER_SIZE: usize = 1024 * 8;

impl AsyncDecoder for Value {
    async fn decode<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Self> {
        let mut parser = Parser::new();
        let mut buf = [0; BUFFER_SIZE];
        loop {
            let read = stream.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            for byte in &buf[0..read] {
                parser.consume(*byte)?;
            }
        }
        parser.result()
    }
}

impl TryFrom<&[u8]> for Value {
    type Error = Error;

    fn try_from(input: &[u8]) -> Result<Self> {
        let mut parser = Parser::new();
        for byte in input {
            parser.consume(*byte)?;
        }
        parser.result()
    }
}

/// Push parser: bytes are fed one at a time, nested collections live on an explicit stack
#[derive(Debug)]
struct Parser {
    token: Token,
    frames: Vec<Frame>,
    position: usize,
}

/// Scalar currently being read
#[derive(Debug)]
enum Token {
    Between,
    Integer { digits: Option<i64>, sign: i64 },
    Zero,
    Length(usize),
    Bytes { bytes: Vec<u8>, remaining: usize },
    Complete(Value),
}

/// Open collection
#[derive(Debug)]
enum Frame {
    List(Vec<Value>),
    Dictionary {
        key: Option<String>,
        entries: BTreeMap<String, Value>,
    },
}

impl Parser {
    fn new() -> Self {
        Self {
            token: Token::Between,
            frames: Vec::new(),
            position: 0,
        }
    }

    fn consume(&mut self, byte: u8) -> Result<()> {
        match &self.token {
            Token::Between => self.begin(byte)?,
            Token::Integer { .. } | Token::Zero => self.integer(byte)?,
            Token::Length(_) => self.length(byte)?,
            Token::Bytes { .. } => self.bytes(byte)?,
            Token::Complete(_) if byte.is_ascii_whitespace() => return Ok(()),
            Token::Complete(_) => return Err(self.unexpected(byte)),
        }
        self.position += 1;
        Ok(())
    }

    fn begin(&mut self, byte: u8) -> Result<()> {
        match byte {
            b'i' => self.token = Token::Integer { digits: None, sign: 1 },
            b'l' => self.frames.push(Frame::List(Vec::new())),
            b'd' => self.frames.push(Frame::Dictionary {
                key: None,
                entries: BTreeMap::new(),
            }),
            b'0'..=b'9' => self.token = Token::Length(digit(byte) as usize),
            b'e' => self.close()?,
            _ => return Err(self.unexpected(byte)),
        }
        Ok(())
    }

    fn integer(&mut self, byte: u8) -> Result<()> {
        match (&mut self.token, byte) {
            (Token::Integer { digits: None, sign }, b'-') if *sign == 1 => *sign = -1,
            (Token::Integer { digits: None, sign: 1 }, b'0') => self.token = Token::Zero,
            (Token::Integer { digits: None, .. }, b'0') => {
                return Err(invalid_input("negative zero not allowed"));
            }
            (Token::Integer { digits, sign }, b'0'..=b'9') => {
                let next = digits
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|value| value.checked_add(digit(byte) * *sign))
                    .ok_or_else(|| invalid_input("integer overflow"))?;
                *digits = Some(next);
            }
            (&mut Token::Integer { digits: Some(value), .. }, b'e') => {
                self.emit(Value::Integer(value))?;
            }
            (Token::Zero, b'e') => self.emit(Value::Integer(0))?,
            (Token::Zero, b'0'..=b'9') => {
                return Err(invalid_input("leading zeros not allowed"));
            }
            _ => return Err(self.unexpected(byte)),
        }
        Ok(())
    }

    fn length(&mut self, byte: u8) -> Result<()> {
        let Token::Length(length) = &mut self.token else {
            return Err(self.unexpected(byte));
        };
        match (*length, byte) {
            (0, b'0'..=b'9') => Err(invalid_input("leading zeros not allowed")),
            (_, b'0'..=b'9') => {
                *length = length
                    .checked_mul(10)
                    .and_then(|value| value.checked_add(digit(byte) as usize))
                    .ok_or_else(|| invalid_input("string length overflow"))?;
                Ok(())
            }
            (0, b':') => self.emit(Value::String(Vec::new())),
            (remaining, b':') => {
                let bytes = Vec::with_capacity(remaining.min(BUFFER_SIZE));
                self.token = Token::Bytes { bytes, remaining };
                Ok(())
            }
            _ => Err(self.unexpected(byte)),
        }
    }

    fn bytes(&mut self, byte: u8) -> Result<()> {
        if let Token::Bytes { bytes, remaining } = &mut self.token {
            bytes.push(byte);
            *remaining -= 1;
            if *remaining == 0 {
                let bytes = std::mem::take(bytes);
                self.emit(Value::String(bytes))?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.frames.pop() {
            Some(Frame::List(values)) => self.emit(Value::List(values)),
            Some(Frame::Dictionary { key: None, entries }) => {
                self.emit(Value::Dictionary(entries))
            }
            Some(Frame::Dictionary { key: Some(key), .. }) => Err(invalid_input(format!(
                "missing value for key {key}"
            ))),
            None => Err(invalid_input("nothing to close")),
        }
    }

    fn emit(&mut self, value: Value) -> Result<()> {
        self.token = Token::Between;
        match self.frames.last_mut() {
            None => self.token = Token::Complete(value),
            Some(Frame::List(values)) => values.push(value),
            Some(Frame::Dictionary { key, entries }) => match (key.take(), value) {
                (Some(key), value) => {
                    entries.insert(key, value);
                }
                (None, Value::String(bytes)) => {
                    let name = String::from_utf8(bytes)
                        .map_err(|_| invalid_input("dictionary key should be valid utf8"))?;
                    *key = Some(name);
                }
                (None, _) => {
                    return Err(invalid_input("only string keys are allowed in dictionaries"));
                }
            },
        }
        Ok(())
    }

    fn result(self) -> Result<Value> {
        match self.token {
            Token::Complete(value) => Ok(value),
            _ => Err(Error::new(ErrorKind::UnexpectedEof, "incomplete")),
        }
    }

    fn unexpected(&self, byte: u8) -> Error {
        invalid_input(format!(
            "unexpected byte: 0x{byte:02x} at position {}",
            self.position
        ))
    }
}

fn digit(byte: u8) -> i64 {
    (byte - b'0') as i64
}

fn invalid_input(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidInput, message.into())
}
