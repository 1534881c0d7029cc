//! Message envelopes and the routines used to build and read their bodies.
//!
//! Bodies are flat byte streams: every argument starts on a 4-byte boundary,
//! integers are 4 native-endian bytes, strings and arrays are a `u32` length
//! followed by the bytes padded to 4 (string lengths include the terminating
//! NUL). A file descriptor is written as 4 bytes at an offset recorded in the
//! envelope so that validation and forwarding layers can find it.

use std::os::unix::io::RawFd;
use std::str;

use crate::iface::{Interface, MethodDesc};
use crate::proxy::Proxy;
use crate::Oid;

/// Method-index sentinel carried by the synthetic message that forces
/// construction of an object without invoking any of its methods.
pub const METHOD_CREATE_OBJECT: u32 = !0;

/// Argument types recognized in method signatures.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ArgType {
    /// u32
    Uint,
    /// i32
    Int,
    /// NUL-terminated UTF-8, length-prefixed
    Str,
    /// raw bytes, length-prefixed
    Array,
    /// file descriptor, stored in the body at the recorded offset
    Fd,
}

/// Error generated when a message body does not match its signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyParseError {
    /// The signature requires a file descriptor but none was written, or it
    /// was written at the wrong offset
    MissingFd,
    /// The body ends before the signature is satisfied
    MissingData,
    /// The body cannot be decoded against the signature
    Malformed,
}

impl std::error::Error for BodyParseError {}

impl std::fmt::Display for BodyParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        f.write_str(match *self {
            BodyParseError::MissingFd => {
                "the method signature requires a file descriptor, but none was written"
            }
            BodyParseError::MissingData => "the message body ends before its signature is satisfied",
            BodyParseError::Malformed => "the message body does not match the method signature",
        })
    }
}

/// A message envelope.
///
/// Messages are immutable once queued; the bus owns them from enqueue until
/// they are dropped after dispatch or at reset.
pub struct Msg {
    interface: &'static Interface,
    method: u32,
    src: Oid,
    dest: Oid,
    body: Vec<u8>,
    fdoffset: Option<u32>,
}

impl Msg {
    /// Start building a message to be sent through `proxy`.
    pub fn begin(proxy: &Proxy, method: u32) -> MsgWriter {
        MsgWriter {
            msg: Msg {
                interface: proxy.interface,
                method,
                src: proxy.src,
                dest: proxy.dest,
                body: Vec::new(),
                fdoffset: None,
            },
        }
    }

    /// The interface this message is addressed through.
    pub fn interface(&self) -> &'static Interface {
        self.interface
    }

    /// Index of the target method, or [`METHOD_CREATE_OBJECT`].
    pub fn method(&self) -> u32 {
        self.method
    }

    /// Id of the sending object, or [`BROADCAST`](crate::BROADCAST).
    pub fn src(&self) -> Oid {
        self.src
    }

    /// Id of the destination object.
    pub fn dest(&self) -> Oid {
        self.dest
    }

    /// The raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Offset of the file descriptor within the body, if one was written.
    pub fn fdoffset(&self) -> Option<u32> {
        self.fdoffset
    }

    /// The file descriptor carried in the body, if any.
    pub fn fd(&self) -> Option<RawFd> {
        self.fdoffset.map(|off| {
            let off = off as usize;
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&self.body[off..off + 4]);
            i32::from_ne_bytes(raw) as RawFd
        })
    }

    /// Signature of the target method, if the method index is in bounds.
    pub fn method_desc(&self) -> Option<&'static MethodDesc> {
        self.interface.methods.get(self.method as usize)
    }

    /// A sequential reader over the body.
    pub fn reader(&self) -> MsgReader<'_> {
        MsgReader { body: &self.body, at: 0, fdoffset: self.fdoffset }
    }

    /// Walk the body against the target method's signature and return the
    /// number of bytes it should occupy.
    ///
    /// This is the enqueue-time validity check: the returned size must equal
    /// the body length, and a written file descriptor must be required by the
    /// signature and sit at the offset the walk reaches it at.
    pub fn validate_signature(&self) -> Result<usize, BodyParseError> {
        if self.method == METHOD_CREATE_OBJECT {
            if !self.body.is_empty() || self.fdoffset.is_some() {
                return Err(BodyParseError::Malformed);
            }
            return Ok(0);
        }
        let desc = self.method_desc().ok_or(BodyParseError::Malformed)?;
        let mut at = 0usize;
        let mut fd_seen = false;
        for arg in desc.signature {
            match *arg {
                ArgType::Uint | ArgType::Int => at = advance(&self.body, at, 4)?,
                ArgType::Str => {
                    let len = read_len(&self.body, at)?;
                    if len == 0 || self.body.get(at + 4 + len - 1) != Some(&0) {
                        return Err(BodyParseError::Malformed);
                    }
                    at = advance(&self.body, at + 4, pad4(len))?;
                }
                ArgType::Array => {
                    let len = read_len(&self.body, at)?;
                    at = advance(&self.body, at + 4, pad4(len))?;
                }
                ArgType::Fd => {
                    if self.fdoffset != Some(at as u32) {
                        return Err(BodyParseError::MissingFd);
                    }
                    at = advance(&self.body, at, 4)?;
                    fd_seen = true;
                }
            }
        }
        if self.fdoffset.is_some() && !fd_seen {
            return Err(BodyParseError::Malformed);
        }
        Ok(at)
    }
}

impl std::fmt::Debug for Msg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "Msg[{}] {} -> {}.{}.{}",
            self.body.len(),
            self.src,
            self.dest,
            self.interface.name,
            self.interface.method_name(self.method)
        )
    }
}

fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

fn advance(body: &[u8], at: usize, by: usize) -> Result<usize, BodyParseError> {
    if at + by > body.len() {
        return Err(BodyParseError::MissingData);
    }
    Ok(at + by)
}

fn read_len(body: &[u8], at: usize) -> Result<usize, BodyParseError> {
    if at + 4 > body.len() {
        return Err(BodyParseError::MissingData);
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&body[at..at + 4]);
    Ok(u32::from_ne_bytes(raw) as usize)
}

/// Incremental builder for a message body.
///
/// Writes must follow the target method's signature; [`MsgWriter::finish`]
/// checks the result in debug builds.
pub struct MsgWriter {
    msg: Msg,
}

impl MsgWriter {
    pub fn write_u32(&mut self, v: u32) -> &mut Self {
        self.msg.body.extend_from_slice(&v.to_ne_bytes());
        self
    }

    pub fn write_i32(&mut self, v: i32) -> &mut Self {
        self.msg.body.extend_from_slice(&v.to_ne_bytes());
        self
    }

    /// Write a length-prefixed NUL-terminated string.
    pub fn write_str(&mut self, s: &str) -> &mut Self {
        let len = s.len() + 1;
        self.write_u32(len as u32);
        self.msg.body.extend_from_slice(s.as_bytes());
        self.msg.body.push(0);
        self.pad_body();
        self
    }

    /// Write a length-prefixed byte array.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.write_u32(bytes.len() as u32);
        self.msg.body.extend_from_slice(bytes);
        self.pad_body();
        self
    }

    /// Write a file descriptor into the body and record its offset.
    ///
    /// At most one descriptor fits in a message.
    pub fn write_fd(&mut self, fd: RawFd) -> &mut Self {
        debug_assert!(self.msg.fdoffset.is_none(), "a message can carry only one file descriptor");
        self.msg.fdoffset = Some(self.msg.body.len() as u32);
        self.write_i32(fd as i32);
        self
    }

    /// Seal the message.
    pub fn finish(self) -> Msg {
        debug_assert_eq!(
            self.msg.validate_signature(),
            Ok(self.msg.body.len()),
            "message body does not match the signature of {}.{}",
            self.msg.interface.name,
            self.msg.interface.method_name(self.msg.method),
        );
        self.msg
    }

    fn pad_body(&mut self) {
        while self.msg.body.len() % 4 != 0 {
            self.msg.body.push(0);
        }
    }
}

/// Sequential typed reader over a message body.
pub struct MsgReader<'a> {
    body: &'a [u8],
    at: usize,
    fdoffset: Option<u32>,
}

impl<'a> MsgReader<'a> {
    pub fn read_u32(&mut self) -> Result<u32, BodyParseError> {
        let v = read_len(self.body, self.at)? as u32;
        self.at += 4;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32, BodyParseError> {
        self.read_u32().map(|v| v as i32)
    }

    pub fn read_str(&mut self) -> Result<&'a str, BodyParseError> {
        let bytes = self.read_prefixed()?;
        match bytes.split_last() {
            Some((&0, s)) => str::from_utf8(s).map_err(|_| BodyParseError::Malformed),
            _ => Err(BodyParseError::Malformed),
        }
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], BodyParseError> {
        self.read_prefixed()
    }

    pub fn read_fd(&mut self) -> Result<RawFd, BodyParseError> {
        if self.fdoffset != Some(self.at as u32) {
            return Err(BodyParseError::MissingFd);
        }
        self.read_i32().map(|v| v as RawFd)
    }

    fn read_prefixed(&mut self) -> Result<&'a [u8], BodyParseError> {
        let len = read_len(self.body, self.at)?;
        let start = self.at + 4;
        let end = start + len;
        if end > self.body.len() {
            return Err(BodyParseError::MissingData);
        }
        self.at = start + pad4(len);
        Ok(&self.body[start..end])
    }
}
