//! Review prompt rendering
//!
//! PR-supplied strings are attacker-controlled: they are XML-escaped and
//! wrapped in explicit UNTRUSTED markers so the system prompt can tell the
//! model to ignore injected instructions. The system prompt itself comes
//! from a trusted on-disk file and is never touched by PR input.

use crate::pr::PullRequestContext;

/// Inline diff budget for the fast-path prompt
pub const FAST_PATH_DIFF_LIMIT: usize = 50 * 1024;

/// Escape untrusted text as XML element content
pub fn escape_untrusted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Render the primary review prompt from a template
///
/// Placeholders: `{{PR_TITLE}}`, `{{PR_AUTHOR}}`, `{{HEAD_BRANCH}}`,
/// `{{BASE_BRANCH}}`, `{{PR_BODY}}`, `{{DIFF_FILE}}`, `{{CURRENT_DATE}}`,
/// `{{PERSPECTIVE}}`.
pub fn render_review_prompt(
    template: &str,
    pr: &PullRequestContext,
    diff_file: &str,
    perspective: &str,
    current_date: &str,
) -> String {
    let replacements = [
        ("{{PR_TITLE}}", escape_untrusted(&pr.title)),
        ("{{PR_AUTHOR}}", escape_untrusted(&pr.author)),
        ("{{HEAD_BRANCH}}", escape_untrusted(&pr.head_branch)),
        ("{{BASE_BRANCH}}", escape_untrusted(&pr.base_branch)),
        ("{{PR_BODY}}", escape_untrusted(&pr.body)),
        ("{{DIFF_FILE}}", diff_file.to_string()),
        ("{{CURRENT_DATE}}", current_date.to_string()),
        ("{{PERSPECTIVE}}", perspective.to_string()),
    ];

    let mut text = template.to_string();
    for (key, value) in replacements {
        text = text.replace(key, &value);
    }
    text
}

/// Render the stripped-down fast-path prompt with the diff inlined
///
/// The diff is truncated at 50 KiB with an explicit truncation marker so the
/// model knows it is looking at a prefix.
pub fn render_fast_path_prompt(
    template: &str,
    perspective: &str,
    reviewer_name: &str,
    diff: &str,
) -> String {
    let diff_content = if diff.len() > FAST_PATH_DIFF_LIMIT {
        let mut end = FAST_PATH_DIFF_LIMIT;
        while !diff.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}\n... (truncated, {} bytes total)",
            &diff[..end],
            diff.len()
        )
    } else {
        diff.to_string()
    };

    template
        .replace("{{PERSPECTIVE}}", perspective)
        .replace("{{REVIEWER_NAME}}", reviewer_name)
        .replace("{{DIFF_CONTENT}}", &diff_content)
}

/// Strip YAML frontmatter from a perspective agent file
///
/// The remaining body becomes the trusted system prompt.
pub fn strip_frontmatter(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("---\n") else {
        return text;
    };
    match rest.find("\n---\n") {
        Some(end) => &rest[end + 5..],
        None => text,
    }
}

/// Changed file paths from a unified diff (first 20, deduplicated)
pub fn extract_diff_files(diff: &str) -> Vec<String> {
    let mut files = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for line in diff.lines() {
        let Some(rest) = line.strip_prefix("diff --git ") else {
            continue;
        };
        let parts: Vec<&str> = rest.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let path = parts[1].strip_prefix("b/").unwrap_or(parts[1]);
        if !path.is_empty() && seen.insert(path.to_string()) {
            files.push(path.to_string());
            if files.len() >= 20 {
                break;
            }
        }
    }
    files
}
