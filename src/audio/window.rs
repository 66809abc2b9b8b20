/// Number of decoded PCM chunks per evaluation
pub const WINDOW_CHUNKS: usize = 10;

/// Fixed, non-overlapping accumulation window of decoded PCM chunks
///
/// Once full, the window hands back the concatenated bytes and starts empty
/// again. Nothing carries over into the next window.
#[derive(Debug)]
pub struct EvaluationWindow {
    chunks: Vec<Vec<u8>>,
    capacity: usize,
}

impl EvaluationWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "evaluation window needs at least one chunk");
        Self {
            chunks: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a chunk. Returns the full window's bytes when this chunk completes it.
    pub fn push(&mut self, chunk: Vec<u8>) -> Option<Vec<u8>> {
        self.chunks.push(chunk);
        if self.chunks.len() < self.capacity {
            return None;
        }

        let combined = self.chunks.concat();
        self.chunks.clear();
        Some(combined)
    }

    /// Chunks buffered since the last evaluation
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl Default for EvaluationWindow {
    fn default() -> Self {
        Self::new(WINDOW_CHUNKS)
    }
}
