//! Structured findings produced by agents

use serde::{Deserialize, Serialize};

/// Severity of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Must be fixed before anything ships
    Critical,
    /// Serious defect
    High,
    /// Default severity when unrecognized
    Medium,
    /// Minor issue
    Low,
    /// Informational note
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }

    /// Rank for ordering, lower is more severe
    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
            Self::Info => 4,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Severity {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            "info" | "informational" => Self::Info,
            _ => Self::Medium,
        }
    }
}

/// Category of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Security,
    Bug,
    Performance,
    Style,
    Maintainability,
    /// Default category when unrecognized
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Bug => "bug",
            Self::Performance => "performance",
            Self::Style => "style",
            Self::Maintainability => "maintainability",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "security" | "vulnerability" => Self::Security,
            "bug" | "correctness" => Self::Bug,
            "performance" | "perf" => Self::Performance,
            "style" => Self::Style,
            "maintainability" | "maintenance" => Self::Maintainability,
            _ => Self::Other,
        }
    }
}

/// Source location of a finding, a single line or an inclusive range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineRef {
    Single(u32),
    Range([u32; 2]),
}

impl LineRef {
    /// Parse `"42"` or `"42-80"`; whitespace tolerated around both parts
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some((start, end)) = s.split_once('-') {
            let start: u32 = start.trim().parse().ok()?;
            let end: u32 = end.trim().parse().ok()?;
            Some(Self::Range([start, end]))
        } else {
            s.parse().ok().map(Self::Single)
        }
    }

    pub fn start(&self) -> u32 {
        match self {
            Self::Single(n) => *n,
            Self::Range([start, _]) => *start,
        }
    }
}

/// A structured observation produced by one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Unique identifier, `{agentName}-{index}`
    pub id: String,
    /// Agent that produced this finding
    pub agent_name: String,
    pub severity: Severity,
    pub category: Category,
    /// File path the finding refers to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<LineRef>,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// First fenced code block in the finding body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Confidence in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// External references such as CWE ids, deduplicated and uppercased
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    /// Set by the merge phase once the finding has been verified
    #[serde(default)]
    pub verified: bool,
}

impl Finding {
    /// Create a finding with defaults for everything optional
    pub fn new(agent_name: &str, index: usize, title: impl Into<String>) -> Self {
        Self {
            id: format!("{}-{}", agent_name, index),
            agent_name: agent_name.to_string(),
            severity: Severity::Medium,
            category: Category::Other,
            file: None,
            line: None,
            title: title.into(),
            description: String::new(),
            suggestion: None,
            code: None,
            confidence: None,
            references: Vec::new(),
            verified: false,
        }
    }
}

/// A group of related findings produced by the merge phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingCluster {
    pub id: String,
    /// Representative title for the cluster
    pub title: String,
    /// Ids of the member findings
    pub finding_ids: Vec<String>,
    /// Highest severity among members
    pub severity: Severity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_defaults_to_medium() {
        assert_eq!(Severity::from("bogus"), Severity::Medium);
        assert_eq!(Severity::from("CRITICAL"), Severity::Critical);
    }

    #[test]
    fn category_defaults_to_other() {
        assert_eq!(Category::from("???"), Category::Other);
        assert_eq!(Category::from("Security"), Category::Security);
    }

    #[test]
    fn line_ref_parses_single_and_range() {
        assert_eq!(LineRef::parse("42"), Some(LineRef::Single(42)));
        assert_eq!(LineRef::parse("10 - 20"), Some(LineRef::Range([10, 20])));
        assert_eq!(LineRef::parse("abc"), None);
    }

    #[test]
    fn finding_roundtrips_through_json() {
        let mut finding = Finding::new("reviewer", 0, "SQL injection");
        finding.severity = Severity::Critical;
        finding.category = Category::Security;
        finding.file = Some("src/db.rs".into());
        finding.line = Some(LineRef::Range([10, 14]));
        finding.references = vec!["CWE-89".into()];

        let json = serde_json::to_string(&finding).unwrap();
        let back: Finding = serde_json::from_str(&json).unwrap();
        assert_eq!(finding, back);
    }
}
