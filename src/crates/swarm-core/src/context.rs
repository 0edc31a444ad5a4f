//! Context assembly under a token budget
//!
//! One provider invocation sees a single system message assembled from
//! priority-ordered segments, optional prior thread history, and a user
//! message carrying the task. Smaller priorities matter more; when the
//! segments overflow the budget, the least important ones are dropped
//! or truncated first. Priority 1 (persona, system prompt, task
//! framing) is never touched.
//!
//! The token budget is `⌊0.75 × contextWindow⌋`; the reserved quarter
//! covers the model's output and message-format overhead. Token counts
//! are estimated as `⌈bytes / 4⌉`; the assembler is a budgeter, not a
//! tokenizer.

use crate::messages::Message;

/// Persona, system prompt, task framing; never truncated
pub const PRIORITY_CORE: u8 = 1;
/// Outputs of upstream nodes
pub const PRIORITY_UPSTREAM: u8 = 2;
/// Inbox messages and scratchpad snapshot
pub const PRIORITY_COORDINATION: u8 = 3;
/// Entity context from an external provider
pub const PRIORITY_ENTITY: u8 = 4;
/// Semantic memory search results
pub const PRIORITY_MEMORY: u8 = 5;
/// Codebase query results
pub const PRIORITY_CODEBASE: u8 = 6;

/// Marker appended to a truncated segment
const ELLIPSIS: &str = "…";

/// Fraction of the context window available to input context
const INPUT_FRACTION: f64 = 0.75;

/// Estimate tokens for a text as `⌈bytes / 4⌉`
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// One block of context with a priority (smaller = more important)
#[derive(Debug, Clone)]
pub struct ContextSegment {
    /// Importance; priority 1 is untouchable
    pub priority: u8,
    /// Segment text
    pub content: String,
}

/// Builds the message list for one provider invocation
///
/// Segments are added in any order; [`assemble`](Self::assemble) sorts
/// them by priority (stable within a priority), compresses them to the
/// budget, and emits the final message list.
#[derive(Debug, Default)]
pub struct ContextAssembler {
    segments: Vec<ContextSegment>,
    thread_history: Vec<Message>,
}

impl ContextAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a context segment; empty content is ignored
    pub fn add_segment(&mut self, priority: u8, content: impl Into<String>) {
        let content = content.into();
        if !content.is_empty() {
            self.segments.push(ContextSegment { priority, content });
        }
    }

    /// Include prior thread history verbatim between system and task
    pub fn with_history(&mut self, history: Vec<Message>) {
        self.thread_history = history;
    }

    /// Assemble the final message list for a model with the given
    /// context window
    pub fn assemble(&self, task: &str, context_window: u32) -> Vec<Message> {
        let budget = (context_window as f64 * INPUT_FRACTION) as usize;
        let retained = fit_to_budget(&self.segments, budget);

        let system_text = retained
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut messages = Vec::with_capacity(self.thread_history.len() + 2);
        messages.push(Message::system(system_text));
        messages.extend(self.thread_history.iter().cloned());
        messages.push(Message::user(task));
        messages
    }
}

/// Compress segments to the token budget
///
/// Segments are processed in descending priority (least important
/// first): a segment that fits entirely within the excess is dropped;
/// otherwise its suffix is cut to the allowed prefix and an ellipsis
/// appended. Processing stops as soon as the running total fits.
/// Priority-1 segments are never dropped or truncated.
fn fit_to_budget(segments: &[ContextSegment], budget: usize) -> Vec<ContextSegment> {
    let mut ordered: Vec<ContextSegment> = segments.to_vec();
    ordered.sort_by_key(|s| s.priority);

    let mut total: usize = ordered.iter().map(|s| estimate_tokens(&s.content)).sum();
    if total <= budget {
        return ordered;
    }

    // Walk from the back: highest priority number, most recently added
    // first.
    let mut index = ordered.len();
    while total > budget && index > 0 {
        index -= 1;
        if ordered[index].priority <= PRIORITY_CORE {
            break;
        }

        let tokens = estimate_tokens(&ordered[index].content);
        let excess = total - budget;

        if tokens <= excess {
            total -= tokens;
            ordered.remove(index);
        } else {
            let allowed = tokens - excess;
            let prefix = truncate_to_char_boundary(&ordered[index].content, allowed * 4);
            let mut content = prefix.to_string();
            content.push_str(ELLIPSIS);
            ordered[index].content = content;
            total = total - tokens + allowed;
        }
    }

    ordered
}

/// Longest prefix of `s` that is at most `max_bytes` long and ends on a
/// char boundary
fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageRole;

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_message_shape() {
        let mut assembler = ContextAssembler::new();
        assembler.add_segment(PRIORITY_CORE, "system prompt");
        assembler.add_segment(PRIORITY_UPSTREAM, "upstream output");

        let messages = assembler.assemble("do the task", 100_000);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert!(messages[0].content.contains("system prompt"));
        assert!(messages[0].content.contains("upstream output"));
        assert_eq!(messages[1].role, MessageRole::User);
        assert_eq!(messages[1].content, "do the task");
    }

    #[test]
    fn test_segments_joined_by_blank_lines() {
        let mut assembler = ContextAssembler::new();
        assembler.add_segment(PRIORITY_CORE, "one");
        assembler.add_segment(PRIORITY_CORE, "two");
        let messages = assembler.assemble("t", 1_000);
        assert_eq!(messages[0].content, "one\n\ntwo");
    }

    #[test]
    fn test_priority_order_in_output() {
        let mut assembler = ContextAssembler::new();
        assembler.add_segment(PRIORITY_COORDINATION, "inbox");
        assembler.add_segment(PRIORITY_CORE, "core");
        assembler.add_segment(PRIORITY_UPSTREAM, "upstream");

        let messages = assembler.assemble("t", 1_000_000);
        let system = &messages[0].content;
        let core_at = system.find("core").unwrap();
        let upstream_at = system.find("upstream").unwrap();
        let inbox_at = system.find("inbox").unwrap();
        assert!(core_at < upstream_at);
        assert!(upstream_at < inbox_at);
    }

    #[test]
    fn test_history_between_system_and_task() {
        let mut assembler = ContextAssembler::new();
        assembler.add_segment(PRIORITY_CORE, "sys");
        assembler.with_history(vec![
            Message::user("earlier question"),
            Message::assistant("earlier answer"),
        ]);

        let messages = assembler.assemble("now", 10_000);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "earlier question");
        assert_eq!(messages[2].content, "earlier answer");
        assert_eq!(messages[3].content, "now");
    }

    #[test]
    fn test_only_core_segments_never_truncate() {
        let mut assembler = ContextAssembler::new();
        // 4000 tokens of priority-1 content against a tiny window.
        assembler.add_segment(PRIORITY_CORE, "x".repeat(16_000));

        let messages = assembler.assemble("t", 100);
        assert_eq!(messages[0].content.len(), 16_000);
        assert!(!messages[0].content.contains(ELLIPSIS));
    }

    #[test]
    fn test_low_priority_dropped_entirely() {
        // Budget: 0.75 * 400 = 300 tokens.
        let mut assembler = ContextAssembler::new();
        assembler.add_segment(PRIORITY_CORE, "c".repeat(1_000)); // 250 tokens
        assembler.add_segment(PRIORITY_CODEBASE, "z".repeat(800)); // 200 tokens, excess 150 < 200 -> truncated
        assembler.add_segment(PRIORITY_MEMORY, "m".repeat(2_000)); // 500 tokens

        let messages = assembler.assemble("t", 400);
        let system = &messages[0].content;
        // Total 950 over budget 300. Codebase (processed first) is 200
        // tokens against an excess of 650: dropped. Memory: 500 tokens
        // against an excess of 450: truncated to 50 tokens.
        assert!(!system.contains('z'));
        assert!(system.contains(ELLIPSIS));
        assert!(system.contains("m"));
        assert_eq!(system.matches('m').count(), 50 * 4);
    }

    #[test]
    fn test_truncation_stops_once_budget_fits() {
        // Budget: 0.75 * 1000 = 750.
        let mut assembler = ContextAssembler::new();
        assembler.add_segment(PRIORITY_CORE, "c".repeat(400)); // 100 tokens
        assembler.add_segment(PRIORITY_UPSTREAM, "u".repeat(2_000)); // 500 tokens
        assembler.add_segment(PRIORITY_COORDINATION, "i".repeat(1_600)); // 400 tokens

        let messages = assembler.assemble("t", 1_000);
        let system = &messages[0].content;
        // Excess 250 comes entirely out of the coordination segment;
        // upstream is left alone.
        assert_eq!(system.matches('u').count(), 2_000);
        assert_eq!(system.matches('i').count(), 150 * 4);
    }

    #[test]
    fn test_multibyte_truncation_is_boundary_safe() {
        let mut assembler = ContextAssembler::new();
        assembler.add_segment(PRIORITY_CORE, "c".repeat(296)); // 74 tokens
        assembler.add_segment(PRIORITY_MEMORY, "é".repeat(200)); // 400 bytes, 100 tokens

        // Budget: 0.75 * 200 = 150 tokens; excess 24 forces truncation
        // inside the multibyte segment.
        let messages = assembler.assemble("t", 200);
        assert!(messages[0].content.contains(ELLIPSIS));
    }

    #[test]
    fn test_empty_segments_ignored() {
        let mut assembler = ContextAssembler::new();
        assembler.add_segment(PRIORITY_CORE, "core");
        assembler.add_segment(PRIORITY_UPSTREAM, "");
        let messages = assembler.assemble("t", 1_000);
        assert_eq!(messages[0].content, "core");
    }
}
