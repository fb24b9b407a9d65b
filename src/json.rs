//! Textual scanner for the small documents the position endpoint returns.
//!
//! This is not a JSON parser. A key matches wherever its quoted text first
//! appears, nesting included, strings have no escape handling and bracket
//! depth ignores string literals. Callers depend on exactly this behaviour.

use core::fmt::{self, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExtractError {
    /// The quoted key text does not occur in the document.
    NotFound,
    /// The key was found but no usable value follows it.
    MalformedValue,
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::NotFound => f.write_str("key not found"),
            ExtractError::MalformedValue => f.write_str("malformed value"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Value<'a> {
    /// Text between the quotes, quotes excluded.
    Text(&'a str),
    /// `{...}` or `[...]`, delimiters included.
    Bracketed(&'a str),
    /// Bare token: number, `true`, `false`, `null`.
    Token(&'a str),
}

impl<'a> Value<'a> {
    pub fn as_str(&self) -> &'a str {
        match *self {
            Value::Text(s) | Value::Bracketed(s) | Value::Token(s) => s,
        }
    }
}

/// Value of the first occurrence of `"key"` in `document`.
pub fn extract_scalar<'a>(document: &'a str, key: &str) -> Result<Value<'a>, ExtractError> {
    let key_end = find_key(document, key, 0).ok_or(ExtractError::NotFound)?;
    value_after(document, key_end).map(|(value, _)| value)
}

/// Index just past the closing quote of the first `"key"` at or after `from`.
fn find_key(document: &str, key: &str, from: usize) -> Option<usize> {
    let bytes = document.as_bytes();
    let key = key.as_bytes();
    let mut at = from;

    while let Some(offset) = bytes[at..].iter().position(|&b| b == b'"') {
        let start = at + offset + 1;
        let end = start + key.len();
        if bytes.get(start..end) == Some(key) && bytes.get(end) == Some(&b'"') {
            return Some(end + 1);
        }
        at = start;
    }

    None
}

/// Reads the value introduced by the next `:` at or after `from`.
/// Returns the value and the index just past it.
fn value_after(document: &str, from: usize) -> Result<(Value<'_>, usize), ExtractError> {
    let bytes = document.as_bytes();

    let colon = bytes[from..]
        .iter()
        .position(|&b| b == b':')
        .ok_or(ExtractError::MalformedValue)?;

    // Only spaces and tabs, newlines are part of the value.
    let mut at = from + colon + 1;
    while matches!(bytes.get(at), Some(b' ' | b'\t')) {
        at += 1;
    }

    match bytes.get(at) {
        None => Err(ExtractError::MalformedValue),

        Some(b'"') => {
            let start = at + 1;
            let len = bytes[start..]
                .iter()
                .position(|&b| b == b'"')
                .ok_or(ExtractError::MalformedValue)?;
            Ok((Value::Text(&document[start..start + len]), start + len + 1))
        }

        Some(&open @ (b'{' | b'[')) => {
            let close = if open == b'{' { b'}' } else { b']' };
            let mut depth = 0usize;

            for (i, &b) in bytes[at..].iter().enumerate() {
                if b == open {
                    depth += 1;
                } else if b == close {
                    depth -= 1;
                    if depth == 0 {
                        let end = at + i + 1;
                        return Ok((Value::Bracketed(&document[at..end]), end));
                    }
                }
            }

            Err(ExtractError::MalformedValue)
        }

        Some(_) => {
            let len = bytes[at..]
                .iter()
                .position(|&b| matches!(b, b',' | b'}' | b']' | b' '))
                .unwrap_or(bytes.len() - at);
            if len == 0 {
                return Err(ExtractError::MalformedValue);
            }
            Ok((Value::Token(&document[at..at + len]), at + len))
        }
    }
}

/// Unparseable or missing numbers decode as zero.
pub fn parse_f64(token: &str) -> f64 {
    token.trim().parse().unwrap_or(0.0)
}

pub fn parse_u64(token: &str) -> u64 {
    token.trim().parse().unwrap_or(0)
}

/// Writes one `key: value` line per key, left to right. Objects one level
/// down are expanded with an indent; anything deeper is printed as is.
/// Stops quietly at the first thing it cannot read.
pub fn render_readable<W: Write>(document: &str, out: &mut W) -> fmt::Result {
    render_level(document, out, 0)
}

fn render_level<W: Write>(document: &str, out: &mut W, depth: usize) -> fmt::Result {
    let bytes = document.as_bytes();
    let mut at = 0;

    while let Some(offset) = bytes[at..].iter().position(|&b| b == b'"') {
        let key_start = at + offset + 1;
        let Some(key_len) = bytes[key_start..].iter().position(|&b| b == b'"') else {
            break;
        };
        let key = &document[key_start..key_start + key_len];

        let Ok((value, end)) = value_after(document, key_start + key_len + 1) else {
            break;
        };

        for _ in 0..depth {
            out.write_str("  ")?;
        }

        match value {
            Value::Bracketed(object) if depth == 0 && object.starts_with('{') => {
                writeln!(out, "{}:", key)?;
                render_level(&object[1..object.len() - 1], out, depth + 1)?;
            }
            _ => writeln!(out, "{}: {}", key, value.as_str())?,
        }

        at = end;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISS: &str = r#"{"timestamp": 1718000000, "message": "success", "iss_position": {"longitude": "-73.5673", "latitude": "45.5017"}}"#;

    #[test]
    fn extracts_top_level_values() {
        assert_eq!(extract_scalar(ISS, "message"), Ok(Value::Text("success")));
        assert_eq!(extract_scalar(ISS, "timestamp"), Ok(Value::Token("1718000000")));
    }

    #[test]
    fn nested_keys_match_like_top_level_ones() {
        assert_eq!(extract_scalar(ISS, "latitude"), Ok(Value::Text("45.5017")));
        assert_eq!(extract_scalar(ISS, "longitude"), Ok(Value::Text("-73.5673")));
    }

    #[test]
    fn first_occurrence_wins() {
        let doc = r#"{"inner":{"id":1},"id":2}"#;
        assert_eq!(extract_scalar(doc, "id"), Ok(Value::Token("1")));
    }

    #[test]
    fn bracketed_value_includes_inner_scalars() {
        let doc = r#"{"a":{"b":1},"c":2}"#;
        assert_eq!(extract_scalar(doc, "a"), Ok(Value::Bracketed(r#"{"b":1}"#)));
        assert_eq!(extract_scalar(doc, "c"), Ok(Value::Token("2")));
    }

    #[test]
    fn arrays_are_returned_raw() {
        let doc = r#"{"list":[1,[2,3]],"n":0}"#;
        assert_eq!(extract_scalar(doc, "list").map(|v| v.as_str()), Ok("[1,[2,3]]"));
    }

    #[test]
    fn missing_key_is_not_found() {
        assert_eq!(extract_scalar(ISS, "altitude"), Err(ExtractError::NotFound));
        assert_eq!(extract_scalar("", "message"), Err(ExtractError::NotFound));
    }

    #[test]
    fn partial_key_text_does_not_match() {
        let doc = r#"{"messages":"many"}"#;
        assert_eq!(extract_scalar(doc, "message"), Err(ExtractError::NotFound));
    }

    #[test]
    fn key_without_colon_is_malformed() {
        assert_eq!(extract_scalar(r#"["message"]"#, "message"), Err(ExtractError::MalformedValue));
    }

    #[test]
    fn unterminated_values_are_malformed() {
        assert_eq!(extract_scalar(r#"{"m":"abc"#, "m"), Err(ExtractError::MalformedValue));
        assert_eq!(extract_scalar(r#"{"m":{"x":1"#, "m"), Err(ExtractError::MalformedValue));
        assert_eq!(extract_scalar(r#"{"m":"#, "m"), Err(ExtractError::MalformedValue));
        assert_eq!(extract_scalar(r#"{"m":,"n":1}"#, "m"), Err(ExtractError::MalformedValue));
    }

    #[test]
    fn escaped_quote_ends_the_string() {
        let doc = r#"{"m":"say \"hi\""}"#;
        assert_eq!(extract_scalar(doc, "m"), Ok(Value::Text("say \\")));
    }

    #[test]
    fn braces_inside_strings_still_count() {
        let doc = r#"{"a":{"s":"{"},"c":1}"#;
        assert_eq!(
            extract_scalar(doc, "a"),
            Ok(Value::Bracketed(r#"{"s":"{"},"c":1}"#))
        );
    }

    #[test]
    fn only_spaces_and_tabs_are_skipped() {
        assert_eq!(extract_scalar("{\"n\": \t7}", "n"), Ok(Value::Token("7")));
        assert_eq!(extract_scalar("{\"n\":\n7}", "n"), Ok(Value::Token("\n7")));
    }

    #[test]
    fn token_stops_at_space() {
        assert_eq!(extract_scalar(r#"{"ok":true , "n":1}"#, "ok"), Ok(Value::Token("true")));
        assert_eq!(extract_scalar(r#"{"n":12"#, "n"), Ok(Value::Token("12")));
    }

    #[test]
    fn extraction_is_repeatable() {
        let first = extract_scalar(ISS, "latitude");
        let second = extract_scalar(ISS, "latitude");
        assert_eq!(first, second);
    }

    #[test]
    fn numbers_decode_or_fall_back_to_zero() {
        assert_eq!(parse_f64("45.5017"), 45.5017);
        assert_eq!(parse_f64("-73.5"), -73.5);
        assert_eq!(parse_f64("north"), 0.0);
        assert_eq!(parse_f64(""), 0.0);
        assert_eq!(parse_u64("1718000000"), 1_718_000_000);
        assert_eq!(parse_u64("\n42"), 42);
        assert_eq!(parse_u64("-1"), 0);
        assert_eq!(parse_u64("12.5"), 0);
    }

    #[test]
    fn renders_one_level_of_nesting() {
        let mut out = heapless::String::<256>::new();
        render_readable(ISS, &mut out).unwrap();
        assert_eq!(
            out.as_str(),
            "timestamp: 1718000000\n\
             message: success\n\
             iss_position:\n  \
             longitude: -73.5673\n  \
             latitude: 45.5017\n"
        );
    }

    #[test]
    fn deeper_nesting_is_opaque() {
        let mut out = heapless::String::<128>::new();
        render_readable(r#"{"a":{"b":{"c":1}},"d":[1,2]}"#, &mut out).unwrap();
        assert_eq!(out.as_str(), "a:\n  b: {\"c\":1}\nd: [1,2]\n");
    }

    #[test]
    fn rendering_stops_at_garbage() {
        let mut out = heapless::String::<64>::new();
        render_readable(r#"{"a":1,"b":"#, &mut out).unwrap();
        assert_eq!(out.as_str(), "a: 1\n");
    }
}
