//! Cleanup of LLM output that is supposed to be a bare JSON document.

/// Strip surrounding whitespace and a markdown code fence
/// (```` ```json ```` or ```` ``` ````) if present.
pub fn clean_json(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = rest.strip_prefix("json").unwrap_or(rest).trim_start();
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim_end();
    }
    s.trim()
}
