use std::borrow::Cow;
use std::fmt;

/// Captured stream content, decoded to text unless raw bytes were asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    Text(String),
    Bytes(Vec<u8>),
}

impl Captured {
    pub(crate) fn from_bytes(bytes: Vec<u8>, decode: bool) -> Self {
        if decode {
            Self::Text(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Self::Bytes(bytes)
        }
    }

    pub fn empty(decode: bool) -> Self {
        Self::from_bytes(Vec::new(), decode)
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Bytes(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl fmt::Display for Captured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: Captured,
    pub stderr: Captured,
}

/// Concatenates per-stage stderr, one block per stage that wrote anything.
pub(crate) fn join_stderr(chunks: Vec<Vec<u8>>) -> Vec<u8> {
    let mut merged = Vec::new();
    for chunk in chunks {
        if chunk.is_empty() {
            continue;
        }
        if !merged.is_empty() && !merged.ends_with(b"\n") {
            merged.push(b'\n');
        }
        merged.extend_from_slice(&chunk);
    }
    merged
}
