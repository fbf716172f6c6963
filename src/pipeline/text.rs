//! Per-turn text accumulation.

/// Collects the text fragments of one turn.
///
/// Fragments are forwarded at arrival granularity; nothing is re-segmented.
#[derive(Debug, Default, Clone)]
pub struct TextAccumulator {
    buffer: String,
    fragments: usize,
}

impl TextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment and returns it for forwarding.
    ///
    /// Empty fragments are recorded as nothing and yield `None`.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        if fragment.is_empty() {
            return None;
        }
        self.buffer.push_str(fragment);
        self.fragments += 1;
        Some(fragment.to_string())
    }

    /// The text received so far this turn.
    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Ends the turn: returns the full text and clears the buffer.
    pub fn finish(&mut self) -> String {
        self.fragments = 0;
        std::mem::take(&mut self.buffer)
    }
}
