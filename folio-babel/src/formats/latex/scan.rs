//! Low-level scanning helpers over LaTeX source.
//!
//! All positions are byte offsets. The helpers only ever split at ASCII
//! delimiters, so every returned offset is a char boundary.

/// Remove `%` comments, keeping escaped `\%`. Lines inside verbatim-like
/// environments are left alone.
pub fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut verbatim: Option<&'static str> = None;

    for line in source.split_inclusive('\n') {
        if let Some(env) = verbatim {
            out.push_str(line);
            if line.contains(&format!("\\end{{{env}}}")) {
                verbatim = None;
            }
            continue;
        }

        let kept = match unescaped_percent(line) {
            Some(at) => {
                let mut kept = line[..at].to_string();
                if line.ends_with('\n') {
                    kept.push('\n');
                }
                kept
            }
            None => line.to_string(),
        };

        for env in ["verbatim", "lstlisting", "minted"] {
            if kept.contains(&format!("\\begin{{{env}}}"))
                && !kept.contains(&format!("\\end{{{env}}}"))
            {
                verbatim = Some(env);
            }
        }
        out.push_str(&kept);
    }
    out
}

fn unescaped_percent(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b != b'%' {
            continue;
        }
        let backslashes = bytes[..i].iter().rev().take_while(|c| **c == b'\\').count();
        if backslashes % 2 == 0 {
            return Some(i);
        }
    }
    None
}

pub fn skip_whitespace(s: &str, mut pos: usize) -> usize {
    let bytes = s.as_bytes();
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// Skip spaces and tabs and at most one newline.
pub fn skip_inline_whitespace(s: &str, mut pos: usize) -> usize {
    let bytes = s.as_bytes();
    let mut newline = false;
    while pos < bytes.len() {
        match bytes[pos] {
            b' ' | b'\t' | b'\r' => pos += 1,
            b'\n' if !newline => {
                newline = true;
                pos += 1;
            }
            _ => break,
        }
    }
    pos
}

/// Control word starting at `pos` (which must be a backslash).
/// Returns the name and the offset after it; control symbols (`\{`, `\\`)
/// have a one-character name.
pub fn command_name(s: &str, pos: usize) -> (&str, usize) {
    let bytes = s.as_bytes();
    let start = pos + 1;
    if start >= bytes.len() {
        return ("", start.min(bytes.len()));
    }
    if !bytes[start].is_ascii_alphabetic() {
        let end = start + s[start..].chars().next().map(char::len_utf8).unwrap_or(1);
        return (&s[start..end], end);
    }
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_alphabetic() {
        end += 1;
    }
    (&s[start..end], end)
}

/// Balanced group delimited by `open`/`close` starting at the first
/// non-whitespace position from `pos`. Returns the inner text and the offset
/// after the closing delimiter.
fn delimited(s: &str, pos: usize, open: u8, close: u8, allow_newlines: bool) -> Option<(&str, usize)> {
    let bytes = s.as_bytes();
    let start = if allow_newlines {
        skip_whitespace(s, pos)
    } else {
        skip_inline_whitespace(s, pos)
    };
    if bytes.get(start) != Some(&open) {
        return None;
    }
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some((&s[start + 1..i], i + 1));
                }
            }
            b'{' if open == b'[' => {
                // Braces inside optional arguments may hide a `]`.
                let (_, end) = delimited(s, i, b'{', b'}', true)?;
                i = end;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Mandatory `{...}` argument.
pub fn group(s: &str, pos: usize) -> Option<(&str, usize)> {
    delimited(s, pos, b'{', b'}', true)
}

/// Optional `[...]` argument on the same line.
pub fn optional(s: &str, pos: usize) -> Option<(&str, usize)> {
    delimited(s, pos, b'[', b']', false)
}

/// Skip an optional star right after a command name.
pub fn star(s: &str, pos: usize) -> (bool, usize) {
    if s.as_bytes().get(pos) == Some(&b'*') {
        (true, pos + 1)
    } else {
        (false, pos)
    }
}

/// Find the `\end{env}` matching a `\begin{env}` whose body starts at `pos`.
/// Returns `(body_end, after_end)`.
pub fn environment_end(s: &str, pos: usize, env: &str) -> Option<(usize, usize)> {
    let begin = format!("\\begin{{{env}}}");
    let end = format!("\\end{{{env}}}");
    let mut depth = 1usize;
    let mut cursor = pos;
    loop {
        let next_end = s[cursor..].find(&end)? + cursor;
        match s[cursor..].find(&begin).map(|b| b + cursor) {
            Some(next_begin) if next_begin < next_end => {
                depth += 1;
                cursor = next_begin + begin.len();
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some((next_end, next_end + end.len()));
                }
                cursor = next_end + end.len();
            }
        }
    }
}

/// Split at a delimiter that is outside braces and not escaped.
pub fn split_top_level<'a>(s: &'a str, delimiter: &str) -> Vec<&'a str> {
    let bytes = s.as_bytes();
    let delim = delimiter.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if depth == 0 && bytes[i..].starts_with(delim) {
            parts.push(&s[start..i]);
            i += delim.len();
            start = i;
            continue;
        }
        match bytes[i] {
            b'\\' if delim != b"\\\\" || !bytes[i..].starts_with(b"\\\\") => {
                i += 2;
                continue;
            }
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
    parts.push(&s[start.min(s.len())..]);
    parts
}

/// Find `\name` at top level (outside nested environments of `nested`).
pub fn find_command(s: &str, name: &str) -> Option<usize> {
    let needle = format!("\\{name}");
    let mut from = 0;
    while let Some(found) = s[from..].find(&needle) {
        let at = from + found;
        let after = at + needle.len();
        let boundary = s[after..]
            .chars()
            .next()
            .map(|c| !c.is_ascii_alphabetic())
            .unwrap_or(true);
        if boundary {
            return Some(at);
        }
        from = after;
    }
    None
}
