//! Project classification rules.
//!
//! Windows are assigned to projects by an ordered rule set: first match wins,
//! ties broken by declaration order. Rules are compiled once; invalid
//! patterns are logged and skipped rather than failing the whole set.

use serde::{Deserialize, Serialize};

use crate::Project;

/// Which window property a rule matches against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    #[default]
    Class,
    Instance,
    Title,
}

/// How a rule's pattern is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    #[default]
    Exact,
    Regex,
    Glob,
}

/// A single classification rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Pattern text, interpreted per `kind`.
    pub pattern: String,
    /// Window property the pattern applies to.
    #[serde(default)]
    pub field: MatchField,
    /// Pattern interpretation.
    #[serde(default)]
    pub kind: PatternKind,
    /// Target project name, or "global".
    pub target: String,
    /// Lower numbers match first.
    #[serde(default = "default_priority")]
    pub priority: u32,
}

fn default_priority() -> u32 {
    50
}

enum Matcher {
    Exact(String),
    Pattern(regex::Regex),
}

impl Matcher {
    fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Exact(expected) => expected == value,
            Matcher::Pattern(re) => re.is_match(value),
        }
    }
}

struct CompiledRule {
    field: MatchField,
    matcher: Matcher,
    target: String,
}

/// Pre-compiled rule set for efficient matching.
pub struct ClassificationEngine {
    rules: Vec<CompiledRule>,
}

impl ClassificationEngine {
    /// Compile an ordered rule set. Rules with unparseable patterns are
    /// skipped with a warning. Each project's scoped window classes become
    /// implicit exact-class rules evaluated after every explicit rule.
    pub fn new(rules: &[ClassificationRule], projects: &[Project]) -> Self {
        let mut indexed: Vec<(u32, usize, &ClassificationRule)> = rules
            .iter()
            .enumerate()
            .map(|(index, rule)| (rule.priority, index, rule))
            .collect();
        indexed.sort_by_key(|(priority, index, _)| (*priority, *index));

        let mut compiled = Vec::with_capacity(rules.len());
        for (_, _, rule) in indexed {
            match compile_matcher(rule) {
                Some(matcher) => compiled.push(CompiledRule {
                    field: rule.field,
                    matcher,
                    target: rule.target.clone(),
                }),
                None => {
                    tracing::warn!(
                        "Skipping classification rule with invalid pattern: {}",
                        rule.pattern
                    );
                }
            }
        }

        for project in projects {
            for class in &project.window_classes {
                compiled.push(CompiledRule {
                    field: MatchField::Class,
                    matcher: Matcher::Exact(class.clone()),
                    target: project.name.clone(),
                });
            }
        }

        Self { rules: compiled }
    }

    /// Classify a window. Returns the target project of the first matching
    /// rule, or `None` when nothing matches (unclassified).
    pub fn classify(&self, app_id: &str, instance: &str, title: &str) -> Option<&str> {
        for rule in &self.rules {
            let value = match rule.field {
                MatchField::Class => app_id,
                MatchField::Instance => instance,
                MatchField::Title => title,
            };
            if rule.matcher.matches(value) {
                return Some(&rule.target);
            }
        }
        None
    }

    /// Number of usable (compiled) rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no rules compiled.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn compile_matcher(rule: &ClassificationRule) -> Option<Matcher> {
    match rule.kind {
        PatternKind::Exact => Some(Matcher::Exact(rule.pattern.clone())),
        PatternKind::Regex => anchored_regex(&rule.pattern).map(Matcher::Pattern),
        PatternKind::Glob => anchored_regex(&glob_to_regex(&rule.pattern)).map(Matcher::Pattern),
    }
}

/// Patterns match the whole value, not a substring.
fn anchored_regex(pattern: &str) -> Option<regex::Regex> {
    regex::Regex::new(&format!("^(?:{pattern})$")).ok()
}

/// Translate a glob (`*`, `?`) into regex source.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out
}
