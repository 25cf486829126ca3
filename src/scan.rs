//! String scanning and reference classification.
//!
//! Sketch sources refer to project assets as quoted literals inside script
//! and style text (`loadSound("sounds/beep.mp3")`) and as bare attribute
//! values (`<img src="cat.png">`). This module finds the literals and
//! decides which candidates name a local project asset.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Quoted string literals, single- or double-quoted. An escaped quote
    /// (`\"`, `\'`) never terminates the literal, a literal never spans
    /// past its closing quote, and raw newlines end the scan (script
    /// strings cannot contain them).
    static ref STRING_LITERAL_RE: Regex =
        Regex::new(r#""(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'"#).unwrap();

    /// Recognized media/text asset extensions (image, audio, video, font,
    /// data formats).
    static ref MEDIA_EXTENSION_RE: Regex = Regex::new(
        r"(?i)\.(png|jpg|jpeg|gif|bmp|mp3|wav|aiff|ogg|json|txt|csv|svg|obj|mp4|webm|mov|otf|ttf|m4a)$",
    )
    .unwrap();

    /// Assets whose content must be fetched as a resource rather than
    /// spliced into the document.
    static ref TEXT_ASSET_RE: Regex = Regex::new(r"(?i)\.(json|txt|csv)$").unwrap();

    static ref EXTERNAL_LINK_RE: Regex = Regex::new(r"(?i)^(http://|https://)").unwrap();
}

/// Yield every quoted string literal in `text`, quotes included, in
/// document order. No literals is a normal outcome, not an error.
pub fn string_literals(text: &str) -> impl Iterator<Item = &str> {
    STRING_LITERAL_RE.find_iter(text).map(|m| m.as_str())
}

/// Rewrite every quoted literal in `text` through `replace`. The closure
/// receives the literal's inner text (quotes stripped) and returns the
/// replacement inner text, or `None` to leave the literal untouched.
pub fn rewrite_string_literals<F>(text: &str, mut replace: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    STRING_LITERAL_RE
        .replace_all(text, |caps: &regex::Captures| {
            let literal = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let quote = &literal[..1];
            match replace(unquote(literal)) {
                Some(inner) => format!("{}{}{}", quote, inner, quote),
                None => literal.to_string(),
            }
        })
        .to_string()
}

/// Strip a single pair of matching quotes, if present.
pub fn unquote(candidate: &str) -> &str {
    let bytes = candidate.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return &candidate[1..candidate.len() - 1];
        }
    }
    candidate
}

/// True for candidates carrying an explicit `http://`/`https://` protocol.
pub fn is_external_link(candidate: &str) -> bool {
    EXTERNAL_LINK_RE.is_match(candidate)
}

/// True for candidates assumed to refer to a file within the project.
/// Exclusive and exhaustive with [`is_external_link`].
pub fn is_local_link(candidate: &str) -> bool {
    !is_external_link(candidate)
}

/// Does `candidate` refer to a local media/text asset? The `quoted`
/// variant expects the string-literal form (`"x.png"`, quotes included);
/// the bare variant expects an attribute value (`x.png`).
pub fn is_local_media_reference(candidate: &str, quoted: bool) -> bool {
    if quoted {
        let inner = unquote(candidate);
        if inner.len() == candidate.len() {
            return false;
        }
        return is_local_media_reference(inner, false);
    }
    is_local_link(candidate) && MEDIA_EXTENSION_RE.is_match(candidate)
}

/// `.json`, `.txt`, `.csv` — inlined via a transient blob reference.
pub fn is_text_asset(name: &str) -> bool {
    TEXT_ASSET_RE.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_basic() {
        let found: Vec<&str> = string_literals(r#"loadSound("beep.mp3"); var x = 'cat.png';"#)
            .collect();
        assert_eq!(found, vec![r#""beep.mp3""#, "'cat.png'"]);
    }

    #[test]
    fn test_literals_escaped_quotes() {
        let found: Vec<&str> = string_literals(r#"var s = "say \"hi\""; var t = 'it\'s';"#)
            .collect();
        assert_eq!(found, vec![r#""say \"hi\"""#, r#"'it\'s'"#]);
    }

    #[test]
    fn test_literals_never_cross_boundaries() {
        // The closing quote of the first literal must not pair with the
        // opening quote of the second.
        let found: Vec<&str> = string_literals(r#""a" + mid + "b""#).collect();
        assert_eq!(found, vec![r#""a""#, r#""b""#]);
    }

    #[test]
    fn test_no_literals_is_empty() {
        assert_eq!(string_literals("var x = 1 + 2;").count(), 0);
    }

    #[test]
    fn test_unterminated_quote_does_not_span_lines() {
        let found: Vec<&str> =
            string_literals("oops(it's broken)\nplay(\"beep.mp3\");").collect();
        assert_eq!(found, vec![r#""beep.mp3""#]);
    }

    #[test]
    fn test_media_reference_quoted() {
        assert!(is_local_media_reference("\"sounds/beep.mp3\"", true));
        assert!(is_local_media_reference("'cat.PNG'", true));
        assert!(!is_local_media_reference("\"http://cdn.example/cat.png\"", true));
        assert!(!is_local_media_reference("\"script.js\"", true));
        // Bare value offered as quoted is rejected.
        assert!(!is_local_media_reference("cat.png", true));
    }

    #[test]
    fn test_media_reference_bare() {
        assert!(is_local_media_reference("cat.png", false));
        assert!(is_local_media_reference("assets/movie.mp4", false));
        assert!(!is_local_media_reference("https://cdn.example/cat.png", false));
        assert!(!is_local_media_reference("style.css", false));
    }

    #[test]
    fn test_link_classification_exclusive() {
        for candidate in ["cat.png", "assets/x.svg", "http://a/b.png", "HTTPS://a/b", "ftp://x"] {
            assert_ne!(is_external_link(candidate), is_local_link(candidate));
        }
        assert!(is_external_link("http://example.com/x.png"));
        assert!(is_local_link("ftp://odd-but-local-by-policy"));
    }

    #[test]
    fn test_text_assets() {
        assert!(is_text_asset("data.json"));
        assert!(is_text_asset("words.TXT"));
        assert!(is_text_asset("table.csv"));
        assert!(!is_text_asset("cat.png"));
    }

    #[test]
    fn test_rewrite_literals() {
        let out = rewrite_string_literals(r#"a("x.png"); b('x.png'); c("y.png");"#, |inner| {
            if inner == "x.png" {
                Some("blob:123".to_string())
            } else {
                None
            }
        });
        assert_eq!(out, r#"a("blob:123"); b('blob:123'); c("y.png");"#);
    }
}
