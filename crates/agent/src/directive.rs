//! Tool directive parsing.
//!
//! A model asks for a tool by writing two consecutive lines:
//!
//! ```text
//! Action: <tool_name>
//! Action Input: <input>
//! ```
//!
//! `<tool_name>` must be one word of `[A-Za-z0-9_]`. The input is the rest
//! of the second line, trimmed. Only the first well-formed pair counts.

use parley_core::tool::is_valid_tool_name;

const ACTION_PREFIX: &str = "Action:";
const INPUT_PREFIX: &str = "Action Input:";

/// A tool request found in a model response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolDirective<'a> {
    pub tool: &'a str,
    pub input: &'a str,
}

/// Find the first tool directive in `text`.
///
/// Returns `None` when there is no `Action:` line, when the name is not a
/// single word, or when the following line is not `Action Input:`.
pub fn parse_directive(text: &str) -> Option<ToolDirective<'_>> {
    let lines: Vec<&str> = text.lines().collect();

    lines.windows(2).find_map(|pair| {
        let tool = pair[0].strip_prefix(ACTION_PREFIX)?.trim();
        if !is_valid_tool_name(tool) {
            return None;
        }
        let input = pair[1].strip_prefix(INPUT_PREFIX)?.trim();
        Some(ToolDirective { tool, input })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_directive() {
        let d = parse_directive("Action: google_search\nAction Input: capital of France").unwrap();
        assert_eq!(d.tool, "google_search");
        assert_eq!(d.input, "capital of France");
    }

    #[test]
    fn directive_inside_react_block() {
        let text = "Thought: Do I need to use a tool? Yes\n\
                    Action: url_fetch\n\
                    Action Input:   https://example.com  \n\
                    Observation:";
        let d = parse_directive(text).unwrap();
        assert_eq!(d.tool, "url_fetch");
        assert_eq!(d.input, "https://example.com");
    }

    #[test]
    fn no_action_line_means_none() {
        assert!(parse_directive("Final Answer: Paris").is_none());
        assert!(parse_directive("").is_none());
    }

    #[test]
    fn missing_input_line_is_malformed() {
        assert!(parse_directive("Action: google_search").is_none());
        assert!(parse_directive("Action: google_search\nThe input: x").is_none());
        assert!(parse_directive("Action: google_search\n\nAction Input: x").is_none());
    }

    #[test]
    fn multi_word_tool_name_is_malformed() {
        assert!(parse_directive("Action: google search\nAction Input: x").is_none());
        assert!(parse_directive("Action:\nAction Input: x").is_none());
    }

    #[test]
    fn empty_input_is_legal() {
        let d = parse_directive("Action: google_search\nAction Input:").unwrap();
        assert_eq!(d.input, "");
    }

    #[test]
    fn only_first_directive_is_returned() {
        let text = "Action: first\nAction Input: one\nAction: second\nAction Input: two";
        let d = parse_directive(text).unwrap();
        assert_eq!(d.tool, "first");
        assert_eq!(d.input, "one");
    }

    #[test]
    fn malformed_block_does_not_hide_a_later_valid_one() {
        let text = "Action: broken\nsomething else\nAction: url_fetch\nAction Input: https://a.b";
        assert_eq!(parse_directive(text).unwrap().tool, "url_fetch");
    }

    #[test]
    fn crlf_line_endings() {
        let d = parse_directive("Action: google_search\r\nAction Input: rust\r\n").unwrap();
        assert_eq!(d.tool, "google_search");
        assert_eq!(d.input, "rust");
    }

    #[test]
    fn prefix_must_start_the_line() {
        assert!(parse_directive("I said Action: google_search\nAction Input: x").is_none());
    }
}
