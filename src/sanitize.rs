//! Script sanitizing transforms.
//!
//! Every inline script body placed into an assembled document passes
//! through two source-to-source transforms:
//!
//! 1. **Comment stripping** — removes `//` and `/* */` comments, except
//!    comments matching an explicit "do not strip" pattern (`noprotect`).
//! 2. **Loop guarding** — injects a bail-out call into every `for`,
//!    `while` and `do` body so the runtime guard can interrupt a loop
//!    that never terminates. A `noprotect` token anywhere in the source
//!    opts the whole script out.
//!
//! Both transforms are quoting-aware lexical scans, not JavaScript
//! parsers, and both preserve the newline count of their input so that
//! runtime line numbers keep mapping back to original source lines.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Comments carrying this token survive stripping; it also disables
    /// loop guarding for the whole script.
    static ref NOPROTECT_RE: Regex = Regex::new("noprotect").unwrap();
}

/// Runtime hook consulted by injected guard statements. Defined by the
/// loop-guard runtime script; the `window.__loopGuard &&` test keeps
/// guarded sketches runnable outside the sandbox.
const GUARD_HOOK: &str = "window.__loopGuard";

/// Apply both transforms in order: strip comments (keeping `noprotect`
/// markers), then guard loops.
pub fn sanitize_script(source: &str) -> String {
    let stripped = strip_comments(source, Some(&NOPROTECT_RE));
    protect_loops(&stripped)
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMENT STRIPPING
// ═══════════════════════════════════════════════════════════════════════════════

/// Remove `//` and `/* */` comments from `source`. Comment-like text
/// inside string or template literals is never touched. A comment whose
/// text matches `ignore` is kept verbatim. Newlines spanned by a dropped
/// block comment are re-emitted so line numbering is stable.
pub fn strip_comments(source: &str, ignore: Option<&Regex>) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '"' || c == '\'' || c == '`' {
            let end = skip_string(&chars, i, chars.len());
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }

        if c == '/' && i + 1 < chars.len() && chars[i + 1] == '/' {
            let end = skip_line_comment(&chars, i, chars.len());
            let comment: String = chars[i..end].iter().collect();
            if matches_ignore(&comment, ignore) {
                out.push_str(&comment);
            }
            // the terminating newline is not part of the comment
            i = end;
            continue;
        }

        if c == '/' && i + 1 < chars.len() && chars[i + 1] == '*' {
            let end = skip_block_comment(&chars, i, chars.len());
            let comment: String = chars[i..end].iter().collect();
            if matches_ignore(&comment, ignore) {
                out.push_str(&comment);
            } else {
                for _ in comment.matches('\n') {
                    out.push('\n');
                }
            }
            i = end;
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

fn matches_ignore(comment: &str, ignore: Option<&Regex>) -> bool {
    ignore.map_or(false, |re| re.is_match(comment))
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOOP GUARDING
// ═══════════════════════════════════════════════════════════════════════════════

/// Inject a guard statement into every loop body. Sources containing a
/// `noprotect` token are returned unchanged. The transform never adds or
/// removes newlines.
pub fn protect_loops(source: &str) -> String {
    if NOPROTECT_RE.is_match(source) {
        return source.to_string();
    }
    let chars: Vec<char> = source.chars().collect();
    let mut counter = 0u32;
    protect_range(&chars, 0, chars.len(), &mut counter)
}

fn guard_statement(id: u32) -> String {
    format!("if ({hook} && {hook}.tick({id})) break; ", hook = GUARD_HOOK, id = id)
}

fn protect_range(chars: &[char], start: usize, end: usize, counter: &mut u32) -> String {
    let mut out = String::new();
    let mut i = start;
    // last significant char, to reject `obj.for`-style property positions
    let mut prev = '\0';

    while i < end {
        let c = chars[i];

        if c == '"' || c == '\'' || c == '`' {
            let e = skip_string(chars, i, end);
            out.extend(&chars[i..e]);
            i = e;
            prev = c;
            continue;
        }

        if c == '/' && i + 1 < end && (chars[i + 1] == '/' || chars[i + 1] == '*') {
            let e = if chars[i + 1] == '/' {
                skip_line_comment(chars, i, end)
            } else {
                skip_block_comment(chars, i, end)
            };
            out.extend(&chars[i..e]);
            i = e;
            continue;
        }

        if is_ident_start(c) {
            let word_end = scan_identifier(chars, i, end);
            let word: String = chars[i..word_end].iter().collect();
            if prev != '.' && (word == "for" || word == "while") {
                out.push_str(&word);
                i = emit_loop(chars, word_end, end, counter, &mut out, true);
                prev = '}';
                continue;
            }
            if prev != '.' && word == "do" {
                out.push_str(&word);
                i = emit_do_loop(chars, word_end, end, counter, &mut out);
                prev = '}';
                continue;
            }
            out.push_str(&word);
            i = word_end;
            prev = 'a';
            continue;
        }

        out.push(c);
        if !c.is_whitespace() {
            prev = c;
        }
        i += 1;
    }

    out
}

/// Copy a `for`/`while` header and instrument its body. Returns the index
/// after the body. `expect_header` is false for `do` bodies, which have
/// no leading parenthesized header.
fn emit_loop(
    chars: &[char],
    mut i: usize,
    end: usize,
    counter: &mut u32,
    out: &mut String,
    expect_header: bool,
) -> usize {
    if expect_header {
        i = copy_whitespace_and_comments(chars, i, end, out);
        if i >= end || chars[i] != '(' {
            return i;
        }
        let header_end = skip_balanced(chars, i, end, '(', ')');
        out.extend(&chars[i..header_end]);
        i = header_end;
    }

    i = copy_whitespace_and_comments(chars, i, end, out);
    if i >= end {
        return i;
    }

    *counter += 1;
    let guard = guard_statement(*counter);

    if chars[i] == '{' {
        let body_end = skip_balanced(chars, i, end, '{', '}');
        out.push('{');
        out.push_str(&guard);
        out.push_str(&protect_range(chars, i + 1, body_end.saturating_sub(1), counter));
        out.push('}');
        return body_end;
    }

    // brace-less body: wrap the single statement
    let stmt_end = find_statement_end(chars, i, end);
    out.push_str("{ ");
    out.push_str(&guard);
    out.push_str(&protect_range(chars, i, stmt_end, counter));
    out.push_str(" }");
    stmt_end
}

/// `do <body> while (<cond>);` — instrument the body, copy the trailing
/// `while` header without treating it as a second loop.
fn emit_do_loop(chars: &[char], i: usize, end: usize, counter: &mut u32, out: &mut String) -> usize {
    let mut i = emit_loop(chars, i, end, counter, out, false);
    i = copy_whitespace_and_comments(chars, i, end, out);

    let word_end = scan_identifier(chars, i, end);
    let word: String = chars[i..word_end].iter().collect();
    if word != "while" {
        return i;
    }
    out.push_str(&word);
    i = copy_whitespace_and_comments(chars, word_end, end, out);
    if i < end && chars[i] == '(' {
        let header_end = skip_balanced(chars, i, end, '(', ')');
        out.extend(&chars[i..header_end]);
        i = header_end;
    }
    i
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCAN PRIMITIVES
// ═══════════════════════════════════════════════════════════════════════════════

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn scan_identifier(chars: &[char], start: usize, end: usize) -> usize {
    let mut i = start;
    while i < end && is_ident_continue(chars[i]) {
        i += 1;
    }
    i
}

/// Index just past the closing quote. Backslash escapes never terminate
/// the literal.
fn skip_string(chars: &[char], start: usize, end: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < end {
        if chars[i] == '\\' {
            i += 2;
            continue;
        }
        if chars[i] == quote {
            return i + 1;
        }
        i += 1;
    }
    end
}

fn skip_line_comment(chars: &[char], start: usize, end: usize) -> usize {
    let mut i = start;
    while i < end && chars[i] != '\n' {
        i += 1;
    }
    i
}

fn skip_block_comment(chars: &[char], start: usize, end: usize) -> usize {
    let mut i = start + 2;
    while i + 1 < end {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    end
}

/// Index just past the balanced `close` matching the `open` at `start`,
/// skipping strings and comments.
fn skip_balanced(chars: &[char], start: usize, end: usize, open: char, close: char) -> usize {
    let mut depth = 0;
    let mut i = start;
    while i < end {
        let c = chars[i];
        if c == '"' || c == '\'' || c == '`' {
            i = skip_string(chars, i, end);
            continue;
        }
        if c == '/' && i + 1 < end && chars[i + 1] == '/' {
            i = skip_line_comment(chars, i, end);
            continue;
        }
        if c == '/' && i + 1 < end && chars[i + 1] == '*' {
            i = skip_block_comment(chars, i, end);
            continue;
        }
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return i + 1;
            }
        }
        i += 1;
    }
    end
}

fn copy_whitespace_and_comments(chars: &[char], mut i: usize, end: usize, out: &mut String) -> usize {
    loop {
        while i < end && chars[i].is_whitespace() {
            out.push(chars[i]);
            i += 1;
        }
        if i + 1 < end && chars[i] == '/' && (chars[i + 1] == '/' || chars[i + 1] == '*') {
            let e = if chars[i + 1] == '/' {
                skip_line_comment(chars, i, end)
            } else {
                skip_block_comment(chars, i, end)
            };
            out.extend(&chars[i..e]);
            i = e;
            continue;
        }
        return i;
    }
}

/// End of a brace-less loop body: the first `;` at bracket depth zero,
/// or the `}` closing an enclosing block, or end of input.
fn find_statement_end(chars: &[char], start: usize, end: usize) -> usize {
    let mut depth: i32 = 0;
    let mut i = start;
    while i < end {
        let c = chars[i];
        if c == '"' || c == '\'' || c == '`' {
            i = skip_string(chars, i, end);
            continue;
        }
        if c == '/' && i + 1 < end && chars[i + 1] == '/' {
            i = skip_line_comment(chars, i, end);
            continue;
        }
        if c == '/' && i + 1 < end && chars[i + 1] == '*' {
            i = skip_block_comment(chars, i, end);
            continue;
        }
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' => depth -= 1,
            '}' => {
                if depth == 0 {
                    return i;
                }
                depth -= 1;
            }
            ';' => {
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    end
}
