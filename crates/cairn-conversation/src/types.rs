/// Compression thresholds the engine evaluates after every successful
/// dispatch cycle. Field names mirror the `CONVERSATION_*` config keys
/// directly so callers can build this straight from `CairnConfig`.
#[derive(Debug, Clone, Copy)]
pub struct CompressionConfig {
    pub message_compress_threshold: usize,
    pub message_keep_count: usize,
    pub min_keep_count: usize,
    pub idle_hours: i64,
    pub retention_hours: i64,
    pub max_summary_tokens: u32,
}

/// What the engine actually did with a mention.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The LLM's reply was posted successfully; these are the status ids
    /// of every part (plural when the reply was split).
    Replied(Vec<String>),
    /// The LLM produced nothing usable, or posting the real reply failed;
    /// an in-character apology was posted instead.
    Apologized(Vec<String>),
}

impl DispatchOutcome {
    pub fn status_ids(&self) -> &[String] {
        match self {
            DispatchOutcome::Replied(ids) => ids,
            DispatchOutcome::Apologized(ids) => ids,
        }
    }
}
