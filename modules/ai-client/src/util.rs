/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip markdown code fences from a response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Pull the outermost JSON object or array out of a chatty response.
///
/// Models sometimes wrap JSON in prose ("Here are the ideas: [...]"). Returns the
/// span from the first `{`/`[` to the last matching closer, or `None` if the
/// response contains neither.
pub fn extract_json(response: &str) -> Option<&str> {
    let body = strip_code_blocks(response);
    let start = body.find(|c: char| c == '{' || c == '[')?;
    let closer = if body[start..].starts_with('{') { '}' } else { ']' };
    let end = body.rfind(closer)?;
    (end > start).then(|| &body[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_to_char_boundary() {
        let text = "Hello 世界";
        let truncated = truncate_to_char_boundary(text, 8);
        assert!(truncated.len() <= 8);
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn test_strip_code_blocks() {
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("{}"), "{}");
    }

    #[test]
    fn extract_json_finds_array_inside_prose() {
        let raw = "Sure! Here you go:\n[{\"index\": 1}]\nLet me know.";
        assert_eq!(extract_json(raw), Some("[{\"index\": 1}]"));
    }

    #[test]
    fn extract_json_handles_fenced_object() {
        let raw = "```json\n{\"ideas\": []}\n```";
        assert_eq!(extract_json(raw), Some("{\"ideas\": []}"));
    }

    #[test]
    fn extract_json_none_without_json() {
        assert_eq!(extract_json("no structured output here"), None);
        assert_eq!(extract_json("only an opener {"), None);
    }
}
