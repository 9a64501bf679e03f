//! Tolerant JSON extraction from model output.

/// Pull a JSON object out of raw model text.
///
/// Accepts bare JSON, fenced ```json blocks, or — failing those — the
/// longest balanced `{…}` substring containing `required_key`.
pub fn extract_json_payload(raw: &str, required_key: Option<&str>) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trim_symmetric(trimmed));
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = after_lang[..end].trim();
            if block.starts_with('{') {
                return Some(trim_symmetric(block));
            }
        }
    }

    longest_balanced_object(raw, required_key)
}

fn longest_balanced_object(raw: &str, required_key: Option<&str>) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut best: Option<&str> = None;

    for (start, _) in raw.char_indices().filter(|(_, c)| *c == '{') {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (offset, &byte) in bytes[start..].iter().enumerate() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    in_string = false;
                }
                continue;
            }
            match byte {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &raw[start..=start + offset];
                        let keyed = required_key
                            .map(|key| candidate.contains(&format!("\"{}\"", key)))
                            .unwrap_or(true);
                        if keyed && candidate.len() > best.map(str::len).unwrap_or(0) {
                            best = Some(candidate);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    best.map(trim_symmetric)
}

fn trim_symmetric(value: &str) -> String {
    value.trim().trim_matches('`').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_json() {
        let raw = r#"{"actions": [], "reasoning": "nothing to do"}"#;
        assert_eq!(extract_json_payload(raw, Some("actions")).unwrap(), raw);
    }

    #[test]
    fn extracts_fenced_block() {
        let raw = "Sure, here you go:\n```json\n{\"actions\": [{\"type\": \"wait\", \"ms\": 100}]}\n```\nDone.";
        let payload = extract_json_payload(raw, Some("actions")).unwrap();
        assert!(payload.starts_with('{'));
        assert!(payload.contains("\"wait\""));
    }

    #[test]
    fn picks_longest_object_with_required_key() {
        let raw = r#"meta {"note": "x"} then {"actions": [{"type": "wait", "ms": 1}], "reasoning": "longer"} trailing"#;
        let payload = extract_json_payload(raw, Some("actions")).unwrap();
        assert!(payload.contains("\"reasoning\""));
        assert!(!payload.contains("\"note\""));
    }

    #[test]
    fn ignores_braces_inside_strings() {
        let raw = r#"noise {"actions": [], "reasoning": "has } brace"} tail"#;
        let payload = extract_json_payload(raw, Some("actions")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["reasoning"], "has } brace");
    }

    #[test]
    fn returns_none_without_object() {
        assert!(extract_json_payload("no json here", Some("actions")).is_none());
    }
}
