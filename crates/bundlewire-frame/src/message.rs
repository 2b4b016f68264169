use std::fmt;

use bytes::Bytes;

/// One opaque message payload.
///
/// In practice this is UTF-8 text, often a JSON document, but the framing
/// never looks inside.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Message(Bytes);

impl Message {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self(payload.into())
    }

    pub const fn from_static(payload: &'static [u8]) -> Self {
        Self(Bytes::from_static(payload))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// View the payload as UTF-8 text.
    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for Message {
    fn from(payload: Bytes) -> Self {
        Self(payload)
    }
}

impl From<Vec<u8>> for Message {
    fn from(payload: Vec<u8>) -> Self {
        Self(Bytes::from(payload))
    }
}

impl From<String> for Message {
    fn from(payload: String) -> Self {
        Self(Bytes::from(payload))
    }
}

impl From<&str> for Message {
    fn from(payload: &str) -> Self {
        Self(Bytes::copy_from_slice(payload.as_bytes()))
    }
}

impl From<&[u8]> for Message {
    fn from(payload: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(payload))
    }
}

impl From<Message> for Bytes {
    fn from(message: Message) -> Self {
        message.0
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Ok(text) => f.debug_tuple("Message").field(&text).finish(),
            Err(_) => write!(f, "Message(<binary {} bytes>)", self.len()),
        }
    }
}
