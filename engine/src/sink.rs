//! Ordered output capture shared between a probe and the engine
//!
//! A sink keeps every byte a probe produced, in order, so that a run cut short
//! by its deadline still returns its partial output. When a stream channel is
//! attached, each chunk is also forwarded (normalized) as it arrives.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;

use crate::normalize;

pub type StreamSender = UnboundedSender<String>;

#[derive(Clone, Default)]
pub struct OutputSink {
    buffer: Arc<Mutex<Vec<u8>>>,
    stream: Option<StreamSender>,
}

impl OutputSink {
    pub fn new(stream: Option<StreamSender>) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream,
        }
    }

    /// A sink with its own buffer that forwards to the same stream.
    /// Used to capture stderr separately from stdout.
    pub fn sibling(&self) -> Self {
        Self::new(self.stream.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.lock().extend_from_slice(chunk);
        if let Some(stream) = &self.stream {
            let (text, _) = normalize::decode_lossy(chunk);
            // The receiver going away just means nobody is watching live
            let _ = stream.send(normalize::strip_control_sequences(&text));
        }
    }

    pub fn line(&self, text: impl AsRef<str>) {
        let mut chunk = text.as_ref().as_bytes().to_vec();
        chunk.push(b'\n');
        self.write(&chunk);
    }

    pub fn lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.line(line);
        }
    }

    /// Copy of everything written so far
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_captures_in_order() {
        let sink = OutputSink::new(None);
        sink.line("first");
        sink.write(b"second ");
        sink.line("third");
        assert_eq!(sink.snapshot(), b"first\nsecond third\n");
        assert_eq!(sink.len(), 19);
    }

    #[test]
    fn test_clones_share_buffer() {
        let sink = OutputSink::new(None);
        let clone = sink.clone();
        clone.line("from clone");
        assert_eq!(sink.snapshot(), b"from clone\n");
    }

    #[test]
    fn test_sibling_has_separate_buffer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stdout = OutputSink::new(Some(tx));
        let stderr = stdout.sibling();
        stdout.line("out");
        stderr.line("err");
        assert_eq!(stdout.snapshot(), b"out\n");
        assert_eq!(stderr.snapshot(), b"err\n");
        assert_eq!(rx.try_recv().unwrap(), "out\n");
        assert_eq!(rx.try_recv().unwrap(), "err\n");
    }

    #[test]
    fn test_stream_is_normalized_but_buffer_is_raw() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = OutputSink::new(Some(tx));
        sink.line("\x1b[32mPASS\x1b[0m");
        assert_eq!(rx.try_recv().unwrap(), "PASS\n");
        assert_eq!(sink.snapshot(), b"\x1b[32mPASS\x1b[0m\n");
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = OutputSink::new(Some(tx));
        sink.line("still captured");
        assert!(!sink.is_empty());
    }
}
