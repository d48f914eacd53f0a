/// Normalizes a user-supplied name into a safe SQL identifier: lowercased,
/// anything outside `[a-z0-9_]` becomes an underscore, runs collapse to one,
/// leading/trailing underscores are stripped. May return an empty string for
/// degenerate input; callers validate that before use.
pub fn sanitize_identifier(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.trim().chars() {
        let mapped = match ch {
            'a'..='z' | '0'..='9' | '_' => ch,
            'A'..='Z' => ch.to_ascii_lowercase(),
            _ => '_',
        };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }
    out.trim_matches('_').to_string()
}

/// Wraps an identifier in double quotes, doubling any embedded quotes.
/// Every identifier in generated SQL goes through sanitize then quote.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
