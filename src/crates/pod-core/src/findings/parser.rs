//! Finding extraction from assistant markdown
//!
//! Assistant text is split on the `### Finding:` delimiter and each trailing
//! block is scanned line by line. The scan is a small state machine (outside /
//! labeled section / code fence) so extraction stays linear in block size even
//! on hostile input; a labeled section ends at the next recognized label
//! header or at a code fence.

use crate::model::{
    AgentMessage, Category, Finding, LineRef, MessageRole, Severity,
};
use regex::Regex;
use std::sync::OnceLock;

const DELIMITER: &str = "### finding:";
const DESCRIPTION_FALLBACK_LEN: usize = 200;

fn cwe_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\bCWE-(\d+)\b").expect("valid CWE pattern"))
}

/// Labels recognized by the block scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Severity,
    Category,
    File,
    Line,
    Confidence,
    Description,
    Suggestion,
}

impl Label {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "severity" => Some(Self::Severity),
            "category" => Some(Self::Category),
            "file" | "path" | "location" => Some(Self::File),
            "line" | "lines" => Some(Self::Line),
            "confidence" => Some(Self::Confidence),
            "description" => Some(Self::Description),
            "suggestion" | "fix" | "recommendation" => Some(Self::Suggestion),
            _ => None,
        }
    }

    /// Whether the label opens a multi-line section
    fn is_section(&self) -> bool {
        matches!(self, Self::Description | Self::Suggestion)
    }
}

/// Parse all findings from the assistant messages of a transcript
///
/// Messages are scanned in order; non-assistant messages are skipped. Finding
/// ids are `{agent_name}-{index}` with a counter running across all messages.
pub fn parse(agent_name: &str, messages: &[AgentMessage]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for message in messages {
        if message.role != MessageRole::Assistant {
            continue;
        }
        let text = message.text();
        for block in split_blocks(&text) {
            let index = findings.len();
            findings.push(parse_block(agent_name, index, block));
        }
    }
    findings
}

/// Split text on the case-insensitive delimiter, returning trailing blocks
///
/// Each returned block starts at the text following `### Finding:` on the
/// delimiter line (the title) and runs to the next delimiter or end of text.
fn split_blocks(text: &str) -> Vec<&str> {
    let lower = text.to_ascii_lowercase();
    let mut starts = Vec::new();
    let mut from = 0;
    while let Some(pos) = lower[from..].find(DELIMITER) {
        starts.push(from + pos + DELIMITER.len());
        from += pos + DELIMITER.len();
    }

    let mut blocks = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = if i + 1 < starts.len() {
            // Back up over the delimiter of the next block
            starts[i + 1] - DELIMITER.len()
        } else {
            text.len()
        };
        blocks.push(&text[start..end]);
    }
    blocks
}

/// Parse one delimited block into a finding
fn parse_block(agent_name: &str, index: usize, block: &str) -> Finding {
    let mut finding = Finding::new(agent_name, index, "");
    let mut lines = block.lines();

    // The first line is the remainder of the delimiter line: the title.
    let title = lines.next().map(str::trim).unwrap_or("");
    if !title.is_empty() {
        finding.title = title.to_string();
    }

    let mut description: Vec<String> = Vec::new();
    let mut suggestion: Vec<String> = Vec::new();
    let mut code: Vec<String> = Vec::new();
    let mut section: Option<Label> = None;
    let mut in_fence = false;
    let mut code_captured = false;

    for line in lines {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            if in_fence {
                in_fence = false;
                code_captured = true;
            } else {
                // A fence always terminates any open labeled section
                section = None;
                in_fence = true;
            }
            continue;
        }

        if in_fence {
            if !code_captured {
                code.push(line.to_string());
            }
            continue;
        }

        if let Some((label, value)) = match_label(trimmed) {
            match label {
                Label::Severity => finding.severity = Severity::from(value),
                Label::Category => finding.category = Category::from(value),
                Label::File => {
                    let value = value.trim();
                    if !value.is_empty() {
                        finding.file = Some(value.trim_matches('`').to_string());
                    }
                }
                Label::Line => finding.line = LineRef::parse(value),
                Label::Confidence => finding.confidence = parse_confidence(value),
                Label::Description | Label::Suggestion => {
                    let target = if label == Label::Description {
                        &mut description
                    } else {
                        &mut suggestion
                    };
                    let value = value.trim();
                    if !value.is_empty() {
                        target.push(value.to_string());
                    }
                }
            }
            section = label.is_section().then_some(label);
            continue;
        }

        match section {
            Some(Label::Description) => description.push(trimmed.to_string()),
            Some(Label::Suggestion) => suggestion.push(trimmed.to_string()),
            _ => {}
        }
    }

    finding.description = join_section(description);
    if finding.description.is_empty() {
        finding.description = truncate(block.trim(), DESCRIPTION_FALLBACK_LEN);
    }
    let suggestion = join_section(suggestion);
    if !suggestion.is_empty() {
        finding.suggestion = Some(suggestion);
    }
    if code_captured || !code.is_empty() {
        let code = code.join("\n");
        if !code.trim().is_empty() {
            finding.code = Some(code);
        }
    }
    finding.references = extract_references(block);
    if finding.title.is_empty() {
        finding.title = fallback_title(block, index);
    }

    finding
}

/// Match a `Label: value` line, tolerating markdown list and bold decorations
fn match_label(line: &str) -> Option<(Label, &str)> {
    let stripped = line
        .trim_start_matches(['-', '*', '>'])
        .trim_start()
        .trim_start_matches("**")
        .trim_start();
    let (name, rest) = stripped.split_once(':')?;
    let name = name.trim_end_matches("**").trim();
    // Guard against sentences with a colon: labels are single short words
    if name.is_empty() || name.len() > 16 || name.contains(char::is_whitespace) {
        return None;
    }
    let label = Label::from_name(name)?;
    Some((label, rest.trim_start_matches("**").trim()))
}

fn parse_confidence(value: &str) -> Option<f64> {
    let value = value.trim().trim_end_matches('%');
    let mut parsed: f64 = value.trim().parse().ok()?;
    if parsed > 1.0 && parsed <= 100.0 {
        parsed /= 100.0;
    }
    (0.0..=1.0).contains(&parsed).then_some(parsed)
}

/// All CWE tokens in the block, uppercased and deduplicated in order
fn extract_references(block: &str) -> Vec<String> {
    let mut references = Vec::new();
    for capture in cwe_pattern().captures_iter(block) {
        let reference = format!("CWE-{}", &capture[1]);
        if !references.contains(&reference) {
            references.push(reference);
        }
    }
    references
}

fn join_section(lines: Vec<String>) -> String {
    let joined = lines.join("\n");
    joined.trim().to_string()
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    // Cut on a char boundary at or below the limit
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

fn fallback_title(block: &str, index: usize) -> String {
    block
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && match_label(l).is_none() && !l.starts_with("```"))
        .map(|l| truncate(l, 80))
        .unwrap_or_else(|| format!("Finding {}", index + 1))
}
