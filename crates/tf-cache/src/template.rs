//! Seed document for a project's markdown task list, and a lenient
//! structural validator for user-supplied replacements.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MIN_TEMPLATE_LEN: usize = 100;
pub const MAX_TEMPLATE_LEN: usize = 50_000;

/// Case-insensitive substrings that make a template unsafe to render.
pub const DANGEROUS_PATTERNS: &[&str] = &["<script", "javascript:"];

static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+\S").expect("valid regex"));
static TASK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\.\d+\.\d+\b").expect("valid regex"));

const DEFAULT_TEMPLATE: &str = "\
# Project Task List

## 1. Setup

### 1.1 Repository

- **1.1.1** Install dependencies
  - **Description:** Install the project's dependencies with the package manager.
  - **Type:** setup
  - **Status:** pending

- **1.1.2** Build the project
  - **Description:** Run the build script and confirm the output directory is produced.
  - **Type:** build
  - **Status:** pending

## 2. Implementation

### 2.1 Features

- **2.1.1** Implement the requested change
  - **Description:** Modify the listed files to satisfy the task requirements.
  - **Type:** feature
  - **Status:** pending

## 3. Delivery

### 3.1 Integration

- **3.1.1** Merge the feature branch
  - **Description:** Merge into the target branch and resolve any conflicts.
  - **Type:** merge
  - **Status:** pending

- **3.1.2** Push to the remote
  - **Description:** Push the merged branch to origin.
  - **Type:** deploy
  - **Status:** pending
";

/// The default task-list template.
pub fn get_default_task_list_template() -> &'static str {
    DEFAULT_TEMPLATE
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateStats {
    pub length: usize,
    pub line_count: usize,
    pub header_count: usize,
    pub task_id_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stats: TemplateStats,
}

/// Check a task-list template. Errors make it unusable; warnings only flag
/// structure the task parser is likely to miss.
pub fn validate_template_format(content: &str) -> TemplateValidation {
    let mut report = TemplateValidation::default();

    if content.trim().is_empty() {
        report.errors.push("template is empty".to_string());
        return report;
    }

    let length = content.chars().count();
    if length < MIN_TEMPLATE_LEN {
        report.errors.push(format!(
            "template is too short ({length} chars, minimum {MIN_TEMPLATE_LEN})"
        ));
    }
    if length > MAX_TEMPLATE_LEN {
        report.errors.push(format!(
            "template is too long ({length} chars, maximum {MAX_TEMPLATE_LEN})"
        ));
    }

    let lower = content.to_lowercase();
    for pattern in DANGEROUS_PATTERNS {
        if lower.contains(pattern) {
            report
                .errors
                .push(format!("template contains dangerous content: {pattern}"));
        }
    }
    if content
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        report
            .errors
            .push("template contains control characters".to_string());
    }

    let header_count = HEADER.find_iter(content).count();
    let task_id_count = TASK_ID.find_iter(content).count();
    if header_count == 0 {
        report.warnings.push("no markdown headers found".to_string());
    }
    if task_id_count == 0 {
        report
            .warnings
            .push("no task ids found (expected e.g. 1.1.1)".to_string());
    }
    for field in ["description", "type", "status"] {
        if !lower.contains(field) {
            report.warnings.push(format!("no {field} fields found"));
        }
    }

    report.stats = TemplateStats {
        length,
        line_count: content.lines().count(),
        header_count,
        task_id_count,
    };
    report.is_valid = report.errors.is_empty();
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_is_clean() {
        let report = validate_template_format(get_default_task_list_template());
        assert!(report.is_valid, "{:?}", report.errors);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert!(report.stats.task_id_count >= 5);
    }

    #[test]
    fn control_characters_rejected_but_whitespace_allowed() {
        let mut body = get_default_task_list_template().to_string();
        body.push_str("\r\n\tindent\n");
        assert!(validate_template_format(&body).is_valid);
        body.push('\u{7}');
        assert!(!validate_template_format(&body).is_valid);
    }
}
