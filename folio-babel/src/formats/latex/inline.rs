//! Inline LaTeX → styled text.
//!
//! Runs of whitespace collapse to one space, style commands become spans over
//! the stripped text and footnotes are pulled out for the caller to emit.

use super::scan::{command_name, group, optional};
use crate::ir::{FormattingKind, StyledText};

/// Inline content of one block.
#[derive(Debug, Default)]
pub struct Inline {
    pub text: StyledText,
    pub footnotes: Vec<String>,
}

pub fn parse_inline(source: &str) -> Inline {
    let mut parser = InlineParser::default();
    parser.run(source);
    Inline {
        text: parser.out.trimmed(),
        footnotes: parser.footnotes,
    }
}

/// Text content only, spans and footnotes dropped.
pub fn plain(source: &str) -> String {
    parse_inline(source).text.text
}

/// Commands whose arguments are not content.
const DROPPED: &[&str] = &[
    "label",
    "index",
    "vspace",
    "hspace",
    "vskip",
    "hskip",
    "includegraphics",
    "bibliographystyle",
    "bibliography",
    "addcontentsline",
    "setlength",
    "setcounter",
    "pagestyle",
    "thispagestyle",
    "caption",
    "nocite",
];

#[derive(Default)]
struct InlineParser {
    out: StyledText,
    styles: Vec<FormattingKind>,
    footnotes: Vec<String>,
}

impl InlineParser {
    fn run(&mut self, src: &str) {
        let bytes = src.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            match bytes[pos] {
                b'\\' => pos = self.command(src, pos),
                b'{' => match group(src, pos) {
                    Some((inner, end)) => {
                        self.bare_group(inner);
                        pos = end;
                    }
                    None => pos += 1,
                },
                b'}' => pos += 1,
                b'$' => pos = self.dollar_math(src, pos),
                b'~' => {
                    self.space();
                    pos += 1;
                }
                b if b.is_ascii_whitespace() => {
                    self.space();
                    pos += 1;
                }
                b'-' if src[pos..].starts_with("---") => {
                    self.text("\u{2014}");
                    pos += 3;
                }
                b'-' if src[pos..].starts_with("--") => {
                    self.text("\u{2013}");
                    pos += 2;
                }
                b'`' if src[pos..].starts_with("``") => {
                    self.text("\u{201c}");
                    pos += 2;
                }
                b'\'' if src[pos..].starts_with("''") => {
                    self.text("\u{201d}");
                    pos += 2;
                }
                _ => {
                    let ch_len = src[pos..].chars().next().map(char::len_utf8).unwrap_or(1);
                    let end = next_special(src, pos + ch_len);
                    self.text(&src[pos..end]);
                    pos = end;
                }
            }
        }
    }

    fn text(&mut self, text: &str) {
        self.out.push_styled(text, &self.styles);
    }

    fn space(&mut self) {
        let last = self.out.text.chars().last();
        if matches!(last, Some(c) if !c.is_whitespace()) {
            self.text(" ");
        }
    }

    fn styled(&mut self, kind: FormattingKind, body: &str) {
        self.styles.push(kind);
        self.run(body);
        self.styles.pop();
    }

    /// `{...}` with an optional leading font declaration (`{\bf x}`).
    fn bare_group(&mut self, inner: &str) {
        let trimmed = inner.trim_start();
        if trimmed.starts_with('\\') {
            let (name, end) = command_name(trimmed, 0);
            if let Some(kind) = declaration_style(name) {
                self.styled(kind, &trimmed[end..]);
                return;
            }
        }
        self.run(inner);
    }

    fn dollar_math(&mut self, src: &str, pos: usize) -> usize {
        let display = src[pos..].starts_with("$$");
        let open = if display { 2 } else { 1 };
        let close = if display { "$$" } else { "$" };
        let start = pos + open;
        match find_unescaped(src, start, close) {
            Some(end) => {
                self.math(&src[start..end]);
                end + close.len()
            }
            None => {
                self.text("$");
                pos + 1
            }
        }
    }

    fn math(&mut self, body: &str) {
        let body = body.trim();
        if body.is_empty() {
            return;
        }
        let mut kinds = self.styles.clone();
        kinds.push(FormattingKind::Math);
        self.out.push_styled(body, &kinds);
    }

    /// Handle the command at `pos`; returns the offset after it.
    fn command(&mut self, src: &str, pos: usize) -> usize {
        let (name, mut end) = command_name(src, pos);
        match name {
            "" => return end,
            "\\" => {
                self.text("\n");
                // `\\[2pt]`
                if let Some((_, after)) = optional(src, end) {
                    end = after;
                }
                return end;
            }
            "&" | "%" | "$" | "#" | "_" | "{" | "}" => {
                self.text(name);
                return end;
            }
            " " | "," | ";" | ":" | "!" => {
                if name != "!" {
                    self.space();
                }
                return end;
            }
            "-" | "/" | "@" => return end,
            "(" => {
                return match src[end..].find("\\)") {
                    Some(close) => {
                        self.math(&src[end..end + close]);
                        end + close + 2
                    }
                    None => end,
                };
            }
            "'" | "`" | "^" | "\"" | "~" | "c" | "=" | "." => {
                return self.accent(name, src, end);
            }
            _ => {}
        }

        if let Some(kind) = command_style(name) {
            return match group(src, end) {
                Some((body, after)) => {
                    self.styled(kind, body);
                    after
                }
                None => end,
            };
        }

        if let Some(symbol) = symbol(name) {
            self.text(symbol);
            // Swallow the `{}` that often terminates a symbol command.
            if src[end..].starts_with("{}") {
                end += 2;
            }
            return end;
        }

        match name {
            "textcolor" | "color" | "colorbox" => self.color(name, src, end),
            "verb" => {
                if src[end..].starts_with('*') {
                    end += 1;
                }
                let Some(delimiter) = src[end..].chars().next() else {
                    return end;
                };
                let body_start = end + delimiter.len_utf8();
                match src[body_start..].find(delimiter) {
                    Some(close) => {
                        let code = FormattingKind::FontFamily("monospace".to_string());
                        let mut kinds = self.styles.clone();
                        kinds.push(code);
                        self.out.push_styled(&src[body_start..body_start + close], &kinds);
                        body_start + close + delimiter.len_utf8()
                    }
                    None => end,
                }
            }
            "footnote" | "footnotetext" => {
                if let Some((_, after)) = optional(src, end) {
                    end = after;
                }
                match group(src, end) {
                    Some((body, after)) => {
                        let text = plain(body);
                        if !text.is_empty() {
                            self.footnotes.push(text);
                        }
                        after
                    }
                    None => end,
                }
            }
            "cite" | "citep" | "citet" | "parencite" | "textcite" | "autocite" => {
                while let Some((_, after)) = optional(src, end) {
                    end = after;
                }
                match group(src, end) {
                    Some((keys, after)) => {
                        let keys: Vec<&str> = keys.split(',').map(str::trim).collect();
                        self.text(&format!("[{}]", keys.join(", ")));
                        after
                    }
                    None => end,
                }
            }
            "ref" | "pageref" | "autoref" | "cref" | "Cref" | "eqref" | "url" | "nolinkurl" => {
                match group(src, end) {
                    Some((arg, after)) => {
                        if name == "eqref" {
                            self.text(&format!("({})", arg.trim()));
                        } else {
                            self.text(arg.trim());
                        }
                        after
                    }
                    None => end,
                }
            }
            "href" => match group(src, end).and_then(|(_, after)| group(src, after)) {
                Some((text, after)) => {
                    self.run(text);
                    after
                }
                None => end,
            },
            _ if DROPPED.contains(&name) => {
                if src[end..].starts_with('*') {
                    end += 1;
                }
                while let Some((_, after)) = optional(src, end) {
                    end = after;
                }
                while let Some((_, after)) = group(src, end) {
                    end = after;
                    if name != "setlength" && name != "setcounter" {
                        break;
                    }
                }
                end
            }
            _ => self.unknown(src, end),
        }
    }

    /// Unknown command: skip optional arguments, keep the text of braced ones.
    fn unknown(&mut self, src: &str, mut end: usize) -> usize {
        if src[end..].starts_with('*') {
            end += 1;
        }
        while let Some((_, after)) = optional(src, end) {
            end = after;
        }
        while src.as_bytes().get(end) == Some(&b'{') {
            match group(src, end) {
                Some((body, after)) => {
                    self.run(body);
                    end = after;
                }
                None => break,
            }
        }
        end
    }

    fn color(&mut self, name: &str, src: &str, mut end: usize) -> usize {
        let mut model = None;
        if let Some((m, after)) = optional(src, end) {
            model = Some(m.trim());
            end = after;
        }
        let Some((spec, after)) = group(src, end) else {
            return end;
        };
        end = after;
        let resolved = resolve_color(model, spec.trim());

        if name == "color" {
            // Declaration form: colors the rest of the enclosing group.
            return end;
        }
        let Some((body, after)) = group(src, end) else {
            return end;
        };
        match (name, resolved) {
            ("colorbox", Some(hex)) => self.styled(FormattingKind::Highlight(hex), body),
            ("colorbox", None) => {
                self.styled(FormattingKind::Highlight(spec.trim().to_string()), body)
            }
            (_, Some(hex)) => self.styled(FormattingKind::FontColor(hex), body),
            (_, None) => self.run(body),
        }
        after
    }

    fn accent(&mut self, accent: &str, src: &str, end: usize) -> usize {
        let (base, after) = match group(src, end) {
            Some((body, after)) if src.as_bytes().get(end) == Some(&b'{') => {
                (body.trim().to_string(), after)
            }
            _ => {
                let rest = &src[end..];
                match rest.chars().next() {
                    Some(c) if c.is_alphabetic() => (c.to_string(), end + c.len_utf8()),
                    _ => (String::new(), end),
                }
            }
        };
        if accent == "~" && base.is_empty() {
            self.space();
            return after;
        }
        let accented = base
            .chars()
            .next()
            .and_then(|c| accented(accent, c))
            .map(String::from)
            .unwrap_or(base);
        self.text(&accented);
        after
    }
}

fn next_special(src: &str, from: usize) -> usize {
    src[from..]
        .find(|c: char| {
            matches!(c, '\\' | '{' | '}' | '$' | '~' | '-' | '`' | '\'') || c.is_ascii_whitespace()
        })
        .map(|i| from + i)
        .unwrap_or(src.len())
}

fn find_unescaped(src: &str, from: usize, needle: &str) -> Option<usize> {
    let mut cursor = from;
    while let Some(found) = src[cursor..].find(needle) {
        let at = cursor + found;
        let backslashes = src.as_bytes()[..at]
            .iter()
            .rev()
            .take_while(|b| **b == b'\\')
            .count();
        if backslashes % 2 == 0 {
            return Some(at);
        }
        cursor = at + needle.len();
    }
    None
}

fn command_style(name: &str) -> Option<FormattingKind> {
    Some(match name {
        "textbf" | "mathbf" => FormattingKind::Bold,
        "textit" | "emph" | "textsl" => FormattingKind::Italic,
        "underline" | "uline" => FormattingKind::Underline,
        "sout" | "st" => FormattingKind::Strikethrough,
        "textsuperscript" => FormattingKind::Superscript,
        "textsubscript" => FormattingKind::Subscript,
        "texttt" => FormattingKind::FontFamily("monospace".to_string()),
        _ => return None,
    })
}

fn declaration_style(name: &str) -> Option<FormattingKind> {
    Some(match name {
        "bf" | "bfseries" => FormattingKind::Bold,
        "it" | "itshape" | "em" | "sl" => FormattingKind::Italic,
        "tt" | "ttfamily" => FormattingKind::FontFamily("monospace".to_string()),
        _ => return None,
    })
}

fn symbol(name: &str) -> Option<&'static str> {
    Some(match name {
        "textbackslash" => "\\",
        "ldots" | "dots" | "textellipsis" => "\u{2026}",
        "LaTeX" => "LaTeX",
        "TeX" => "TeX",
        "today" => "",
        "textendash" => "\u{2013}",
        "textemdash" => "\u{2014}",
        "copyright" | "textcopyright" => "\u{a9}",
        "S" => "\u{a7}",
        "P" => "\u{b6}",
        "quad" | "qquad" | "enspace" => " ",
        "textasciitilde" => "~",
        "textasciicircum" => "^",
        "textless" => "<",
        "textgreater" => ">",
        "textbar" => "|",
        "par" | "newline" | "linebreak" => "\n",
        _ => return None,
    })
}

/// Named colors of the `xcolor` base set, as hex.
fn resolve_color(model: Option<&str>, spec: &str) -> Option<String> {
    match model {
        Some(m) if m.eq_ignore_ascii_case("html") => {
            let hex = spec.trim_start_matches('#');
            return (hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
                .then(|| hex.to_ascii_uppercase());
        }
        Some(m) if m.eq_ignore_ascii_case("rgb") => {
            let parts: Vec<f32> = spec
                .split(',')
                .filter_map(|p| p.trim().parse::<f32>().ok())
                .collect();
            if parts.len() != 3 {
                return None;
            }
            let scale = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
            return Some(format!(
                "{:02X}{:02X}{:02X}",
                scale(parts[0]),
                scale(parts[1]),
                scale(parts[2])
            ));
        }
        Some(_) => return None,
        None => {}
    }
    let hex = match spec.to_ascii_lowercase().as_str() {
        "red" => "FF0000",
        "green" => "00FF00",
        "blue" => "0000FF",
        "black" => "000000",
        "white" => "FFFFFF",
        "gray" | "grey" => "808080",
        "darkgray" => "404040",
        "lightgray" => "BFBFBF",
        "cyan" => "00FFFF",
        "magenta" => "FF00FF",
        "yellow" => "FFFF00",
        "orange" => "FF8000",
        "purple" => "BF0040",
        "brown" => "BF8040",
        "violet" => "800080",
        "teal" => "008080",
        "olive" => "808000",
        "lime" => "BFFF00",
        "pink" => "FFBFBF",
        _ => return None,
    };
    Some(hex.to_string())
}

fn accented(accent: &str, base: char) -> Option<char> {
    let table: &[(char, char)] = match accent {
        "'" => &[('a', 'á'), ('e', 'é'), ('i', 'í'), ('o', 'ó'), ('u', 'ú'), ('E', 'É')],
        "`" => &[('a', 'à'), ('e', 'è'), ('i', 'ì'), ('o', 'ò'), ('u', 'ù')],
        "^" => &[('a', 'â'), ('e', 'ê'), ('i', 'î'), ('o', 'ô'), ('u', 'û')],
        "\"" => &[
            ('a', 'ä'),
            ('e', 'ë'),
            ('i', 'ï'),
            ('o', 'ö'),
            ('u', 'ü'),
            ('A', 'Ä'),
            ('O', 'Ö'),
            ('U', 'Ü'),
        ],
        "~" => &[('n', 'ñ'), ('a', 'ã'), ('o', 'õ'), ('N', 'Ñ')],
        "c" => &[('c', 'ç'), ('C', 'Ç')],
        _ => &[],
    };
    table.iter().find(|(b, _)| *b == base).map(|(_, a)| *a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FormattingSpan;

    fn finish(source: &str) -> (String, Vec<FormattingSpan>) {
        parse_inline(source).text.finish()
    }

    #[test]
    fn bold_command_becomes_span() {
        let (text, spans) = finish("Some \\textbf{bold} text.");
        assert_eq!(text, "Some bold text.");
        assert_eq!(spans, vec![FormattingSpan::new(5, 4, FormattingKind::Bold)]);
    }

    #[test]
    fn whitespace_collapses_and_tilde_is_space() {
        let (text, _) = finish("  one\n   two~three  ");
        assert_eq!(text, "one two three");
    }

    #[test]
    fn nested_styles() {
        let (text, spans) = finish("\\textbf{a \\emph{b}}");
        assert_eq!(text, "a b");
        assert_eq!(
            spans,
            vec![
                FormattingSpan::new(0, 3, FormattingKind::Bold),
                FormattingSpan::new(2, 1, FormattingKind::Italic),
            ]
        );
    }

    #[test]
    fn math_is_kept_verbatim() {
        let (text, spans) = finish("Let $x^2 + \\alpha$ and \\(y\\).");
        assert_eq!(text, "Let x^2 + \\alpha and y.");
        assert_eq!(
            spans,
            vec![
                FormattingSpan::new(4, 12, FormattingKind::Math),
                FormattingSpan::new(21, 1, FormattingKind::Math),
            ]
        );
    }

    #[test]
    fn footnotes_are_pulled_out() {
        let inline = parse_inline("Claim\\footnote{See \\emph{there}.} holds.");
        assert_eq!(inline.text.text, "Claim holds.");
        assert_eq!(inline.footnotes, vec!["See there.".to_string()]);
    }

    #[test]
    fn references_render_as_text() {
        let (text, _) = finish(
            "As \\cite{knuth84, lamport} show in Fig.~\\ref{fig:a}\\label{x}, see \\href{http://x.org}{site}.",
        );
        assert_eq!(text, "As [knuth84, lamport] show in Fig. fig:a, see site.");
    }

    #[test]
    fn escapes_are_unescaped() {
        let (text, _) = finish("50\\% of \\$5 \\& more\\_stuff");
        assert_eq!(text, "50% of $5 & more_stuff");
    }

    #[test]
    fn unknown_commands_keep_argument_text() {
        let (text, spans) = finish("\\mycmd[opt]{kept} \\textsc{Small}");
        assert_eq!(text, "kept Small");
        assert!(spans.is_empty());
    }

    #[test]
    fn textcolor_and_texttt() {
        let (text, spans) = finish("\\textcolor[HTML]{ff0000}{red} \\textcolor{blue}{b} \\texttt{x}");
        assert_eq!(text, "red b x");
        assert_eq!(
            spans,
            vec![
                FormattingSpan::new(0, 3, FormattingKind::FontColor("FF0000".to_string())),
                FormattingSpan::new(4, 1, FormattingKind::FontColor("0000FF".to_string())),
                FormattingSpan::new(6, 1, FormattingKind::FontFamily("monospace".to_string())),
            ]
        );
    }

    #[test]
    fn declaration_groups() {
        let (text, spans) = finish("{\\bf strong} words");
        assert_eq!(text, "strong words");
        assert_eq!(spans, vec![FormattingSpan::new(0, 6, FormattingKind::Bold)]);
    }

    #[test]
    fn accents_and_dashes() {
        assert_eq!(plain("G\\\"odel --- na\\\"ive"), "Gödel \u{2014} naïve");
    }
}
