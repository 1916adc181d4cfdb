//! Node Kinds
//!
//! The closed set of node types the hierarchy engine knows about. Each kind is a
//! tag on the universal [`Node`](crate::models::Node); per-kind behavior (merge
//! capability, line syntax) is looked up from this enum rather than dispatched
//! through trait objects.

use crate::models::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Known node types, serialized in kebab-case (`"code-block"`, `"quote-block"`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Text,
    Header,
    Task,
    Date,
    CodeBlock,
    QuoteBlock,
    OrderedList,
    Schema,
}

// Header prefix: one to six hashes followed by whitespace, first line only
const HEADER_PATTERN: &str = r"^#{1,6}[ \t]+";

// Task checkbox prefix: "- [ ] " or "- [x] "
const TASK_PATTERN: &str = r"^[ \t]*- \[[ xX]\][ \t]*";

// Quote prefix on every line: "> " or ">"
const QUOTE_PATTERN: &str = r"(?m)^>[ \t]?";

// Ordered list prefix on every line: "1. ", "12. "
const ORDERED_LIST_PATTERN: &str = r"(?m)^\d+\.[ \t]+";

// Fenced code block: opening fence with optional language, closing fence
const CODE_FENCE_PATTERN: &str = r"(?s)^```[^\n]*\n?(.*?)\n?```[ \t]*$";

fn cached_regex(cell: &'static OnceLock<Regex>, pattern: &'static str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("line syntax pattern is valid"))
}

impl NodeKind {
    /// All kinds, in declaration order
    pub const ALL: [NodeKind; 8] = [
        NodeKind::Text,
        NodeKind::Header,
        NodeKind::Task,
        NodeKind::Date,
        NodeKind::CodeBlock,
        NodeKind::QuoteBlock,
        NodeKind::OrderedList,
        NodeKind::Schema,
    ];

    /// Wire name of the kind (matches the serde representation)
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Text => "text",
            NodeKind::Header => "header",
            NodeKind::Task => "task",
            NodeKind::Date => "date",
            NodeKind::CodeBlock => "code-block",
            NodeKind::QuoteBlock => "quote-block",
            NodeKind::OrderedList => "ordered-list",
            NodeKind::Schema => "schema",
        }
    }

    /// Remove this kind's line syntax from `content`.
    ///
    /// Used when content of this kind is appended to a node of a different
    /// kind: the target must not inherit a `# ` or `> ` prefix it cannot render.
    /// Kinds without line syntax return the content unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use nodespace_hierarchy::models::NodeKind;
    ///
    /// assert_eq!(NodeKind::Header.strip_line_syntax("## Title"), "Title");
    /// assert_eq!(NodeKind::QuoteBlock.strip_line_syntax("> a\n> b"), "a\nb");
    /// assert_eq!(NodeKind::Text.strip_line_syntax("## kept"), "## kept");
    /// ```
    pub fn strip_line_syntax(&self, content: &str) -> String {
        static HEADER: OnceLock<Regex> = OnceLock::new();
        static TASK: OnceLock<Regex> = OnceLock::new();
        static QUOTE: OnceLock<Regex> = OnceLock::new();
        static ORDERED: OnceLock<Regex> = OnceLock::new();
        static FENCE: OnceLock<Regex> = OnceLock::new();

        match self {
            NodeKind::Header => cached_regex(&HEADER, HEADER_PATTERN)
                .replace(content, "")
                .into_owned(),
            NodeKind::Task => cached_regex(&TASK, TASK_PATTERN)
                .replace(content, "")
                .into_owned(),
            NodeKind::QuoteBlock => cached_regex(&QUOTE, QUOTE_PATTERN)
                .replace_all(content, "")
                .into_owned(),
            NodeKind::OrderedList => cached_regex(&ORDERED, ORDERED_LIST_PATTERN)
                .replace_all(content, "")
                .into_owned(),
            NodeKind::CodeBlock => cached_regex(&FENCE, CODE_FENCE_PATTERN)
                .captures(content)
                .and_then(|caps| caps.get(1))
                .map(|inner| inner.as_str().to_string())
                .unwrap_or_else(|| content.to_string()),
            NodeKind::Text | NodeKind::Date | NodeKind::Schema => content.to_string(),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidNodeType(s.to_string()))
    }
}
