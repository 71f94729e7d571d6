//! Prompt contamination cleaner
//!
//! Continuation-prompted models echo their instructions: XML-ish context
//! tags, the instruction sentence itself, or a truncated prefix of it.
//! Removal runs in priority groups (paired tags first, bare tags last) with
//! a per-pattern reduction cap, and the whole stage reverts to its input
//! when total removal crosses the emergency threshold.

use regex::{Regex, RegexBuilder};

use crate::config::{CleaningStrategy, ConfigError, Language};

use super::{CleaningContext, CleaningIssue, CleaningResult, IssueKind, TextCleaner};

struct PatternGroup {
    name: &'static str,
    patterns: Vec<Regex>,
}

pub struct PromptContaminationCleaner {
    strategy: &'static CleaningStrategy,
    groups: Vec<PatternGroup>,
    context_patterns: Vec<Regex>,
    generic_tag: Regex,
}

impl PromptContaminationCleaner {
    pub fn new(strategy: &'static CleaningStrategy) -> Result<Self, ConfigError> {
        let contamination = &strategy.contamination;

        let compile = |scope: &'static str, sources: &[String], multi_line: bool| {
            sources
                .iter()
                .map(|source| {
                    RegexBuilder::new(source)
                        .multi_line(multi_line)
                        .build()
                        .map_err(|e| ConfigError::BadPattern {
                            scope: scope.to_string(),
                            pattern: source.clone(),
                            message: e.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()
        };

        let groups = vec![
            PatternGroup {
                name: "complete_xml_tags",
                patterns: compile("complete_xml_tags", &contamination.complete_xml_tags, false)?,
            },
            PatternGroup {
                name: "sentence_bounded_tags",
                patterns: compile(
                    "sentence_bounded_tags",
                    &contamination.sentence_bounded_tags,
                    false,
                )?,
            },
            PatternGroup {
                name: "line_bounded_tags",
                patterns: compile("line_bounded_tags", &contamination.line_bounded_tags, true)?,
            },
            PatternGroup {
                name: "standalone_tags",
                patterns: compile("standalone_tags", &contamination.standalone_tags, false)?,
            },
        ];

        Ok(Self {
            strategy,
            groups,
            context_patterns: compile("context_patterns", &contamination.context_patterns, false)?,
            generic_tag: Regex::new(r"</?[A-Za-z_][^>]*>").expect("static generic tag pattern"),
        })
    }

    /// Apply one pattern with the per-pattern reduction cap against the
    /// stage input length.
    fn apply_capped(
        &self,
        current: String,
        pattern: &Regex,
        stage_input_length: usize,
        label: &str,
        matched: &mut Vec<String>,
        issues: &mut Vec<CleaningIssue>,
    ) -> String {
        let candidate = pattern.replace_all(&current, "");
        if candidate.as_ref() == current.as_str() {
            return current;
        }

        let removed = current.chars().count() as f64 - candidate.chars().count() as f64;
        let reduction = removed / stage_input_length.max(1) as f64;
        if reduction > self.strategy.safety.single_pattern_max_reduction {
            issues.push(CleaningIssue::new(
                IssueKind::Warning,
                format!(
                    "{} pattern skipped, would remove {:.0}% alone",
                    label,
                    reduction * 100.0
                ),
            ));
            return current;
        }

        matched.push(format!("{}:{}", label, pattern.as_str()));
        candidate.into_owned()
    }

    /// Strip configured instruction prompts sitting at the very start of
    /// the text, repeatedly: models sometimes echo several.
    fn strip_leading_prompts(&self, mut current: String, matched: &mut Vec<String>) -> String {
        loop {
            let trimmed = current.trim_start();
            let Some(prompt) = self
                .strategy
                .contamination
                .instruction_prompts
                .iter()
                .find(|p| trimmed.starts_with(p.as_str()))
            else {
                break;
            };
            matched.push(format!("leading_prompt:{prompt}"));
            let offset = current.len() - trimmed.len() + prompt.len();
            current = current[offset..].trim_start().to_string();
        }
        current
    }

    /// Aggressive extras: instruction prompts embedded anywhere, and
    /// truncated prompt prefixes at the start.
    fn strip_aggressive(&self, mut current: String, matched: &mut Vec<String>) -> String {
        let contamination = &self.strategy.contamination;

        for prompt in &contamination.instruction_prompts {
            if current.contains(prompt.as_str()) {
                matched.push(format!("embedded_prompt:{prompt}"));
                current = current.replace(prompt.as_str(), "");
            }
        }

        for prompt in &contamination.instruction_prompts {
            for &length in &contamination.truncated_prompt_lengths {
                let prefix: String = prompt.chars().take(length).collect();
                if prefix.chars().count() < length {
                    continue;
                }
                let trimmed = current.trim_start();
                if trimmed.starts_with(&prefix) {
                    matched.push(format!("truncated_prompt[{length}]"));
                    let offset = current.len() - trimmed.len() + prefix.len();
                    current = current[offset..].trim_start().to_string();
                }
            }
        }

        current
    }

    fn dedupe_paragraphs(current: &str, matched: &mut Vec<String>) -> String {
        let mut seen = std::collections::HashSet::new();
        let mut kept: Vec<&str> = Vec::new();
        let mut dropped = 0usize;

        for paragraph in current.split("\n\n") {
            let key = paragraph.trim();
            if key.is_empty() || seen.insert(key.to_string()) {
                kept.push(paragraph);
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 {
            matched.push(format!("duplicate-paragraph x{dropped}"));
        }
        kept.join("\n\n")
    }
}

impl TextCleaner for PromptContaminationCleaner {
    fn name(&self) -> &'static str {
        "prompt_contamination"
    }

    fn clean(&self, text: &str, _language: Language, _context: &CleaningContext) -> CleaningResult {
        if text.is_empty() {
            return CleaningResult::unchanged(text);
        }

        let stage_input_length = text.chars().count();
        let mut issues: Vec<CleaningIssue> = Vec::new();
        let mut matched: Vec<String> = Vec::new();
        let mut current = text.to_string();

        if self.strategy.contamination.remove_xml_tags {
            for group in &self.groups {
                for pattern in &group.patterns {
                    current = self.apply_capped(
                        current,
                        pattern,
                        stage_input_length,
                        group.name,
                        &mut matched,
                        &mut issues,
                    );
                }
            }
            // Unknown tags the config groups did not anticipate.
            current = self.apply_capped(
                current,
                &self.generic_tag,
                stage_input_length,
                "generic_tag",
                &mut matched,
                &mut issues,
            );
        }

        current = self.strip_leading_prompts(current, &mut matched);
        for pattern in &self.context_patterns {
            current = self.apply_capped(
                current,
                pattern,
                stage_input_length,
                "context_pattern",
                &mut matched,
                &mut issues,
            );
        }

        if self.strategy.contamination.aggressive_mode {
            current = self.strip_aggressive(current, &mut matched);
        }

        current = Self::dedupe_paragraphs(&current, &mut matched);

        // Collapse 3+ newlines to a paragraph break.
        while current.contains("\n\n\n") {
            current = current.replace("\n\n\n", "\n\n");
        }

        let cleaned_length = current.chars().count();
        let total_reduction =
            (stage_input_length as f64 - cleaned_length as f64) / stage_input_length as f64;

        if total_reduction > self.strategy.safety.emergency_fallback_threshold {
            issues.push(CleaningIssue::new(
                IssueKind::ExcessiveRemoval,
                format!(
                    "contamination removal reached {:.0}%, reverting to input",
                    total_reduction * 100.0
                ),
            ));
            return CleaningResult::from_change(text, text.to_string(), issues, matched);
        }
        if total_reduction > self.strategy.safety.warning_threshold {
            issues.push(CleaningIssue::new(
                IssueKind::Warning,
                format!("contamination removal at {:.0}%", total_reduction * 100.0),
            ));
        }

        CleaningResult::from_change(text, current, issues, matched)
    }
}
