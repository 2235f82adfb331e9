//! Rolling conversation memory
//!
//! Keeps a coarse digest of past topics without replaying the transcript.
//! Every fifth turn the triggering user message is reduced to a short node;
//! at most [`MEMORY_CAPACITY`] nodes are retained, oldest evicted first.

/// Maximum number of memory nodes retained
pub const MEMORY_CAPACITY: usize = 5;

/// A node is recorded on every turn whose ordinal is a multiple of this
pub const MEMORY_CADENCE: usize = 5;

/// Characters of the user message kept in a node
const NODE_PREFIX_CHARS: usize = 30;

/// Whether the turn with the given 1-based ordinal produces a memory node
pub fn should_summarize(turn: usize) -> bool {
    turn > 0 && turn % MEMORY_CADENCE == 0
}

/// Digest a user message into a memory node
///
/// Short messages are not padded; the ellipsis is always appended.
pub fn summarize(user_message: &str) -> String {
    let prefix: String = user_message.chars().take(NODE_PREFIX_CHARS).collect();
    format!("Last discussed: {}...", prefix)
}

/// Append a node, evicting from the front past capacity
pub fn remember(nodes: &mut Vec<String>, node: String) {
    nodes.push(node);
    truncate_to_capacity(nodes);
}

/// Keep only the most recent [`MEMORY_CAPACITY`] nodes
pub fn truncate_to_capacity(nodes: &mut Vec<String>) {
    if nodes.len() > MEMORY_CAPACITY {
        let excess = nodes.len() - MEMORY_CAPACITY;
        nodes.drain(..excess);
    }
}

/// Run the summarizer for a completed turn
///
/// Returns the node that was recorded, if the cadence fired.
pub fn record_turn(nodes: &mut Vec<String>, turn: usize, user_message: &str) -> Option<String> {
    if !should_summarize(turn) {
        return None;
    }
    let node = summarize(user_message);
    remember(nodes, node.clone());
    tracing::debug!(turn, nodes = nodes.len(), "memory node recorded");
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence() {
        assert!(!should_summarize(0));
        assert!(!should_summarize(1));
        assert!(!should_summarize(4));
        assert!(should_summarize(5));
        assert!(!should_summarize(6));
        assert!(should_summarize(10));
    }

    #[test]
    fn test_summarize_short_message_is_not_padded() {
        assert_eq!(summarize("Tell me a joke"), "Last discussed: Tell me a joke...");
    }

    #[test]
    fn test_summarize_truncates_to_thirty_chars() {
        let node = summarize("What is the airspeed velocity of an unladen swallow?");
        assert_eq!(node, "Last discussed: What is the airspeed velocity o...");
    }

    #[test]
    fn test_summarize_counts_characters_not_bytes() {
        let message = "é".repeat(40);
        let node = summarize(&message);
        assert_eq!(node, format!("Last discussed: {}...", "é".repeat(30)));
    }

    #[test]
    fn test_capacity_keeps_most_recent_in_insertion_order() {
        let mut nodes = Vec::new();
        for i in 0..12 {
            remember(&mut nodes, format!("node {}", i));
            assert!(nodes.len() <= MEMORY_CAPACITY);
        }
        let expected: Vec<String> = (7..12).map(|i| format!("node {}", i)).collect();
        assert_eq!(nodes, expected);
    }

    #[test]
    fn test_record_turn_only_fires_on_cadence() {
        let mut nodes = Vec::new();
        assert_eq!(record_turn(&mut nodes, 1, "Hello"), None);
        assert!(nodes.is_empty());

        let node = record_turn(&mut nodes, 5, "Tell me a joke");
        assert_eq!(node.as_deref(), Some("Last discussed: Tell me a joke..."));
        assert_eq!(nodes, vec!["Last discussed: Tell me a joke...".to_string()]);
    }
}
