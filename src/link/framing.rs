use bytes::{Bytes, BytesMut};

/// How a framer treats the letters it accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseMode {
    /// Keep bytes exactly as received.
    Preserve,
    /// Fold the whole buffer to ASCII uppercase before scanning.
    Uppercase,
}

/// Newline framer over an append-only byte buffer.
///
/// Bytes are appended with [`extend`](LineFramer::extend) and complete lines are drained with
/// [`lines`](LineFramer::lines). Anything after the last newline stays buffered for the next
/// call, so the extracted lines depend only on the concatenated input and never on how it was
/// chunked.
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    case: CaseMode,
}

impl LineFramer {
    pub fn new(case: CaseMode) -> Self {
        Self {
            buffer: BytesMut::new(),
            case,
        }
    }

    /// Framer for command text arriving at the drone.
    pub fn uppercase() -> Self {
        Self::new(CaseMode::Uppercase)
    }

    /// Framer for telemetry and acknowledgments arriving at the ground station.
    pub fn verbatim() -> Self {
        Self::new(CaseMode::Preserve)
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        if self.case == CaseMode::Uppercase {
            self.buffer.make_ascii_uppercase();
        }
    }

    /// Remove and return the next complete line, without its newline.
    pub fn next_line(&mut self) -> Option<Bytes> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line = self.buffer.split_to(pos + 1);
        line.truncate(pos);
        Some(line.freeze())
    }

    /// Drain the complete lines currently buffered, in arrival order.
    pub fn lines(&mut self) -> Lines<'_> {
        Lines { framer: self }
    }

    /// Partial data waiting for its newline.
    pub fn remainder(&self) -> &[u8] {
        &self.buffer
    }
}

/// Iterator returned by [`LineFramer::lines`].
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_line()
    }
}
