//! JSON extraction from semi-structured model output

use std::sync::LazyLock;

use regex::Regex;

static JSON_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("json fence pattern")
});

/// The last fenced ```json block in the text, if any
///
/// Models often emit intermediate JSON while reasoning; the final block is
/// the verdict.
pub fn extract_json_block(text: &str) -> Option<&str> {
    JSON_FENCE_RE
        .captures_iter(text)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Parse a block strictly; on failure, fall back to the largest balanced
/// JSON object inside it that parses
pub fn parse_block(block: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(block) {
        if value.is_object() {
            return Some(value);
        }
    }
    largest_json_object(block)
}

/// Scan for balanced `{...}` candidates and return the largest that parses
/// as an object
fn largest_json_object(text: &str) -> Option<serde_json::Value> {
    let bytes = text.as_bytes();
    let mut best: Option<(usize, serde_json::Value)> = None;

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;
        for (offset, &b) in bytes[i..].iter().enumerate() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i + offset + 1);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(end) = end else {
            i += 1;
            continue;
        };
        let candidate = &text[i..end];
        if best.as_ref().map_or(true, |(len, _)| candidate.len() > *len) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
                if value.is_object() {
                    best = Some((candidate.len(), value));
                }
            }
        }
        i = end;
    }

    best.map(|(_, value)| value)
}

/// Extract a verdict header from unstructured markdown
/// (`## Verdict: PASS|WARN|FAIL`)
pub fn extract_verdict_from_markdown(text: &str) -> Option<&str> {
    static VERDICT_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^## Verdict:\s*(PASS|WARN|FAIL)").expect("verdict header pattern")
    });
    VERDICT_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Whether text looks like a scratchpad review document
pub fn is_scratchpad(text: &str) -> bool {
    text.contains("## Investigation Notes") || text.contains("## Verdict:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_last_json_block() {
        let text = "```json\n{\"a\": 1}\n```\nmore prose\n```json\n{\"b\": 2}\n```\n";
        let block = extract_json_block(text).unwrap();
        assert!(block.contains("\"b\""));
    }

    #[test]
    fn test_no_json_block() {
        assert!(extract_json_block("just prose").is_none());
        assert!(extract_json_block("```python\nprint()\n```").is_none());
    }

    #[test]
    fn test_parse_block_strict() {
        let value = parse_block("{\"verdict\": \"PASS\"}").unwrap();
        assert_eq!(value["verdict"], "PASS");
    }

    #[test]
    fn test_parse_block_falls_back_to_largest_object() {
        // Trailing junk breaks strict parsing; the embedded object survives.
        let value = parse_block("{\"verdict\": \"PASS\", \"n\": 1} trailing junk").unwrap();
        assert_eq!(value["verdict"], "PASS");
    }

    #[test]
    fn test_largest_object_ignores_braces_in_strings() {
        let text = r#"noise {"summary": "uses { and } inside", "verdict": "WARN"} tail"#;
        let value = parse_block(text).unwrap();
        assert_eq!(value["verdict"], "WARN");
    }

    #[test]
    fn test_parse_block_unsalvageable() {
        assert!(parse_block("{not json at all").is_none());
    }

    #[test]
    fn test_extract_verdict_from_markdown() {
        assert_eq!(
            extract_verdict_from_markdown("## Verdict: FAIL\ndetails"),
            Some("FAIL")
        );
        assert_eq!(extract_verdict_from_markdown("no verdict"), None);
    }

    #[test]
    fn test_is_scratchpad() {
        assert!(is_scratchpad("## Investigation Notes\n..."));
        assert!(is_scratchpad("intro\n## Verdict: PASS"));
        assert!(!is_scratchpad("plain text"));
    }
}
