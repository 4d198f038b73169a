use std::time::Duration;

/// One cue of an SRT file; `sequence_number` is its 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtitle {
    pub(crate) sequence_number: usize,
    pub(crate) show_at: Duration,
    pub(crate) hide_at: Duration,
    pub(crate) text: String,
}
