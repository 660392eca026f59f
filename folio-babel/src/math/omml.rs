//! OMML (Office Math Markup Language) to LaTeX.

use super::{MathConversion, MathConverter};
use roxmltree::Node;

const MAX_DEPTH: usize = 128;

/// Namespace declarations wrapped around a bare fragment so prefixed names
/// resolve when the fragment is lifted out of its package part.
const WRAPPER_OPEN: &str = concat!(
    r#"<folio-math "#,
    r#"xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math" "#,
    r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:w14="http://schemas.microsoft.com/office/word/2010/wordml" "#,
    r#"xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
);
const WRAPPER_CLOSE: &str = "</folio-math>";

/// Default OMML converter.
///
/// Handles runs, fractions, scripts, radicals, delimiters, n-ary operators,
/// functions, accents, bars, group characters, limits, equation arrays and
/// matrices. Unknown elements contribute the conversion of their children.
#[derive(Debug, Clone, Copy, Default)]
pub struct OmmlConverter;

impl MathConverter for OmmlConverter {
    fn convert(&self, native: &str) -> MathConversion {
        let wrapped = format!("{WRAPPER_OPEN}{native}{WRAPPER_CLOSE}");
        let doc = match roxmltree::Document::parse(&wrapped) {
            Ok(doc) => doc,
            Err(err) => return MathConversion::failure(format!("invalid OMML: {err}")),
        };

        let mut ctx = Context::default();
        match children(&mut ctx, doc.root_element(), 0) {
            Ok(latex) => {
                let latex = tidy(&latex);
                if latex.is_empty() {
                    MathConversion::failure("equation has no content")
                } else {
                    MathConversion::success(latex)
                }
            }
            Err(err) => MathConversion::failure(err),
        }
    }
}

#[derive(Default)]
struct Context {
    /// Inside an equation array or matrix, where `&` aligns columns.
    aligned: usize,
}

type Converted = Result<String, String>;

fn children(ctx: &mut Context, node: Node, depth: usize) -> Converted {
    let mut out = String::new();
    for child in node.children().filter(Node::is_element) {
        out.push_str(&element(ctx, child, depth + 1)?);
    }
    Ok(out)
}

fn element(ctx: &mut Context, node: Node, depth: usize) -> Converted {
    if depth > MAX_DEPTH {
        return Err("equation nesting too deep".to_string());
    }

    match node.tag_name().name() {
        "r" => Ok(run(ctx, node)),
        "f" => fraction(ctx, node, depth),
        "sSup" => Ok(format!(
            "{{{}}}^{{{}}}",
            part(ctx, node, "e", depth)?,
            part(ctx, node, "sup", depth)?
        )),
        "sSub" => Ok(format!(
            "{{{}}}_{{{}}}",
            part(ctx, node, "e", depth)?,
            part(ctx, node, "sub", depth)?
        )),
        "sSubSup" => Ok(format!(
            "{{{}}}_{{{}}}^{{{}}}",
            part(ctx, node, "e", depth)?,
            part(ctx, node, "sub", depth)?,
            part(ctx, node, "sup", depth)?
        )),
        "sPre" => Ok(format!(
            "{{}}_{{{}}}^{{{}}}{{{}}}",
            part(ctx, node, "sub", depth)?,
            part(ctx, node, "sup", depth)?,
            part(ctx, node, "e", depth)?
        )),
        "rad" => radical(ctx, node, depth),
        "d" => delimiter(ctx, node, depth),
        "nary" => nary(ctx, node, depth),
        "func" => function(ctx, node, depth),
        "acc" => accent(ctx, node, depth),
        "bar" => {
            let body = part(ctx, node, "e", depth)?;
            let top = property(node, "barPr", "pos").as_deref() == Some("top");
            Ok(if top {
                format!("\\overline{{{body}}}")
            } else {
                format!("\\underline{{{body}}}")
            })
        }
        "groupChr" => group_char(ctx, node, depth),
        "limLow" => lower_limit(ctx, node, depth),
        "limUpp" => Ok(format!(
            "\\overset{{{}}}{{{}}}",
            part(ctx, node, "lim", depth)?,
            part(ctx, node, "e", depth)?
        )),
        "eqArr" => {
            ctx.aligned += 1;
            let rows = parts(ctx, node, "e", depth);
            ctx.aligned -= 1;
            Ok(format!(
                "\\begin{{aligned}}{}\\end{{aligned}}",
                rows?.join(" \\\\ ")
            ))
        }
        "m" => matrix(ctx, node, depth),
        // Property bags carry no content of their own.
        name if name.ends_with("Pr") => Ok(String::new()),
        _ => children(ctx, node, depth),
    }
}

fn run(ctx: &Context, node: Node) -> String {
    let text: String = node
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "t")
        .filter_map(|t| t.text())
        .collect();

    let normal_text = node
        .children()
        .filter(|c| c.tag_name().name() == "rPr")
        .flat_map(|pr| pr.children())
        .any(|c| c.tag_name().name() == "nor");
    if normal_text {
        return format!("\\text{{{text}}}");
    }

    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if pending_space && ch.is_ascii_alphabetic() {
            out.push(' ');
        }
        pending_space = false;
        if let Some(command) = symbol(ch) {
            out.push_str(command);
            pending_space = command.starts_with('\\')
                && command[1..].chars().all(|c| c.is_ascii_alphabetic());
            continue;
        }
        match ch {
            '{' | '}' | '%' | '#' | '$' | '_' => {
                out.push('\\');
                out.push(ch);
            }
            '&' if ctx.aligned == 0 => out.push_str("\\&"),
            _ => out.push(ch),
        }
    }
    if pending_space {
        out.push(' ');
    }
    out
}

fn fraction(ctx: &mut Context, node: Node, depth: usize) -> Converted {
    let num = part(ctx, node, "num", depth)?;
    let den = part(ctx, node, "den", depth)?;
    Ok(match property(node, "fPr", "type").as_deref() {
        Some("lin") => format!("{num}/{den}"),
        Some("noBar") => format!("\\genfrac{{}}{{}}{{0pt}}{{}}{{{num}}}{{{den}}}"),
        _ => format!("\\frac{{{num}}}{{{den}}}"),
    })
}

fn radical(ctx: &mut Context, node: Node, depth: usize) -> Converted {
    let body = part(ctx, node, "e", depth)?;
    let hidden = flag(node, "radPr", "degHide");
    let degree = part(ctx, node, "deg", depth)?;
    Ok(if hidden || degree.trim().is_empty() {
        format!("\\sqrt{{{body}}}")
    } else {
        format!("\\sqrt[{degree}]{{{body}}}")
    })
}

fn delimiter(ctx: &mut Context, node: Node, depth: usize) -> Converted {
    let open = property(node, "dPr", "begChr").unwrap_or_else(|| "(".to_string());
    let close = property(node, "dPr", "endChr").unwrap_or_else(|| ")".to_string());
    let separator = property(node, "dPr", "sepChr").unwrap_or_else(|| "|".to_string());
    let items = parts(ctx, node, "e", depth)?;
    let separator = if separator == "|" {
        " \\mid ".to_string()
    } else {
        delimiter_char(&separator)
    };
    Ok(format!(
        "\\left{}{}\\right{}",
        delimiter_char(&open),
        items.join(&separator),
        delimiter_char(&close)
    ))
}

fn delimiter_char(value: &str) -> String {
    match value {
        "" => ".".to_string(),
        "{" => "\\{".to_string(),
        "}" => "\\}".to_string(),
        "⟨" | "〈" => "\\langle ".to_string(),
        "⟩" | "〉" => "\\rangle ".to_string(),
        "⌊" => "\\lfloor ".to_string(),
        "⌋" => "\\rfloor ".to_string(),
        "⌈" => "\\lceil ".to_string(),
        "⌉" => "\\rceil ".to_string(),
        "‖" => "\\| ".to_string(),
        other => other.to_string(),
    }
}

fn nary(ctx: &mut Context, node: Node, depth: usize) -> Converted {
    let operator = match property(node, "naryPr", "chr").as_deref() {
        None => "\\int",
        Some("∑") => "\\sum",
        Some("∏") => "\\prod",
        Some("∐") => "\\coprod",
        Some("∬") => "\\iint",
        Some("∭") => "\\iiint",
        Some("∮") => "\\oint",
        Some("⋃") => "\\bigcup",
        Some("⋂") => "\\bigcap",
        Some("⋁") => "\\bigvee",
        Some("⋀") => "\\bigwedge",
        Some(_) => "\\int",
    };
    let mut out = operator.to_string();
    let sub = part(ctx, node, "sub", depth)?;
    let sup = part(ctx, node, "sup", depth)?;
    if !flag(node, "naryPr", "subHide") && !sub.trim().is_empty() {
        out.push_str(&format!("_{{{sub}}}"));
    }
    if !flag(node, "naryPr", "supHide") && !sup.trim().is_empty() {
        out.push_str(&format!("^{{{sup}}}"));
    }
    out.push_str(&format!("{{{}}}", part(ctx, node, "e", depth)?));
    Ok(out)
}

const KNOWN_FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "cot", "sec", "csc", "arcsin", "arccos", "arctan", "sinh", "cosh",
    "tanh", "coth", "log", "ln", "lg", "exp", "lim", "max", "min", "sup", "inf", "det", "dim",
    "gcd", "deg", "arg", "ker", "Pr",
];

fn function(ctx: &mut Context, node: Node, depth: usize) -> Converted {
    let name = part(ctx, node, "fName", depth)?;
    let body = part(ctx, node, "e", depth)?;
    let trimmed = name.trim();
    let head = if KNOWN_FUNCTIONS.contains(&trimmed) {
        format!("\\{trimmed}")
    } else if trimmed.starts_with('\\') {
        trimmed.to_string()
    } else {
        format!("\\operatorname{{{trimmed}}}")
    };
    Ok(format!("{head}{{{body}}}"))
}

fn accent(ctx: &mut Context, node: Node, depth: usize) -> Converted {
    let body = part(ctx, node, "e", depth)?;
    let command = match property(node, "accPr", "chr").as_deref() {
        None | Some("\u{0302}") | Some("^") => "\\hat",
        Some("\u{0303}") | Some("~") => "\\tilde",
        Some("\u{0304}") | Some("\u{00AF}") => "\\bar",
        Some("\u{20D7}") | Some("\u{2192}") => "\\vec",
        Some("\u{0307}") => "\\dot",
        Some("\u{0308}") => "\\ddot",
        Some("\u{030C}") => "\\check",
        Some("\u{0301}") => "\\acute",
        Some("\u{0300}") => "\\grave",
        Some("\u{0306}") => "\\breve",
        Some(_) => "\\hat",
    };
    Ok(format!("{command}{{{body}}}"))
}

fn group_char(ctx: &mut Context, node: Node, depth: usize) -> Converted {
    let body = part(ctx, node, "e", depth)?;
    let top = property(node, "groupChrPr", "pos").as_deref() == Some("top");
    let chr = property(node, "groupChrPr", "chr");
    let command = match chr.as_deref() {
        Some("⏞") => "\\overbrace",
        Some("⏟") | None => {
            if top {
                "\\overbrace"
            } else {
                "\\underbrace"
            }
        }
        Some(_) if top => "\\overset{\\frown}",
        Some(_) => "\\underset{\\smile}",
    };
    Ok(format!("{command}{{{body}}}"))
}

fn lower_limit(ctx: &mut Context, node: Node, depth: usize) -> Converted {
    let base = part(ctx, node, "e", depth)?;
    let limit = part(ctx, node, "lim", depth)?;
    let trimmed = base.trim();
    if matches!(trimmed, "lim" | "max" | "min" | "sup" | "inf") {
        Ok(format!("\\{trimmed}_{{{limit}}}"))
    } else if trimmed.starts_with('\\') && trimmed[1..].chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(format!("{trimmed}_{{{limit}}}"))
    } else {
        Ok(format!("\\underset{{{limit}}}{{{base}}}"))
    }
}

fn matrix(ctx: &mut Context, node: Node, depth: usize) -> Converted {
    ctx.aligned += 1;
    let mut rows = Vec::new();
    for row in node
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "mr")
    {
        match parts(ctx, row, "e", depth + 1) {
            Ok(cells) => rows.push(cells.join(" & ")),
            Err(err) => {
                ctx.aligned -= 1;
                return Err(err);
            }
        }
    }
    ctx.aligned -= 1;
    Ok(format!(
        "\\begin{{matrix}}{}\\end{{matrix}}",
        rows.join(" \\\\ ")
    ))
}

/// Conversion of the first child element named `name`, empty if absent.
fn part(ctx: &mut Context, node: Node, name: &str, depth: usize) -> Converted {
    match node
        .children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
    {
        Some(child) => children(ctx, child, depth + 1),
        None => Ok(String::new()),
    }
}

fn parts(ctx: &mut Context, node: Node, name: &str, depth: usize) -> Result<Vec<String>, String> {
    node.children()
        .filter(|c| c.is_element() && c.tag_name().name() == name)
        .map(|child| children(ctx, child, depth + 1))
        .collect()
}

/// `m:val` of `<props><prop m:val=".."/></props>`.
fn property(node: Node, props: &str, prop: &str) -> Option<String> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == props)?
        .children()
        .find(|c| c.is_element() && c.tag_name().name() == prop)
        .map(|p| {
            p.attributes()
                .find(|a| a.name() == "val")
                .map(|a| a.value().to_string())
                .unwrap_or_default()
        })
}

/// On/off property: present without a value, or with `1`/`on`/`true`.
fn flag(node: Node, props: &str, prop: &str) -> bool {
    match property(node, props, prop) {
        Some(value) => value.is_empty() || matches!(value.as_str(), "1" | "on" | "true"),
        None => false,
    }
}

fn tidy(latex: &str) -> String {
    let mut out = String::with_capacity(latex.len());
    let mut last_space = false;
    for ch in latex.trim().chars() {
        if ch == ' ' {
            if !last_space {
                out.push(ch);
            }
            last_space = true;
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out
}

fn symbol(ch: char) -> Option<&'static str> {
    Some(match ch {
        'α' => "\\alpha",
        'β' => "\\beta",
        'γ' => "\\gamma",
        'δ' => "\\delta",
        'ε' => "\\epsilon",
        'ϵ' => "\\epsilon",
        'ζ' => "\\zeta",
        'η' => "\\eta",
        'θ' => "\\theta",
        'ϑ' => "\\vartheta",
        'ι' => "\\iota",
        'κ' => "\\kappa",
        'λ' => "\\lambda",
        'μ' => "\\mu",
        'ν' => "\\nu",
        'ξ' => "\\xi",
        'π' => "\\pi",
        'ρ' => "\\rho",
        'σ' => "\\sigma",
        'ς' => "\\varsigma",
        'τ' => "\\tau",
        'υ' => "\\upsilon",
        'φ' => "\\phi",
        'ϕ' => "\\phi",
        'χ' => "\\chi",
        'ψ' => "\\psi",
        'ω' => "\\omega",
        'Γ' => "\\Gamma",
        'Δ' => "\\Delta",
        'Θ' => "\\Theta",
        'Λ' => "\\Lambda",
        'Ξ' => "\\Xi",
        'Π' => "\\Pi",
        'Σ' => "\\Sigma",
        'Υ' => "\\Upsilon",
        'Φ' => "\\Phi",
        'Ψ' => "\\Psi",
        'Ω' => "\\Omega",
        '∞' => "\\infty",
        '≤' => "\\leq",
        '≥' => "\\geq",
        '≠' => "\\neq",
        '≈' => "\\approx",
        '≡' => "\\equiv",
        '∼' => "\\sim",
        '≅' => "\\cong",
        '∝' => "\\propto",
        '±' => "\\pm",
        '∓' => "\\mp",
        '×' => "\\times",
        '÷' => "\\div",
        '·' | '⋅' => "\\cdot",
        '∘' => "\\circ",
        '…' => "\\ldots",
        '⋯' => "\\cdots",
        '→' => "\\rightarrow",
        '←' => "\\leftarrow",
        '↔' => "\\leftrightarrow",
        '⇒' => "\\Rightarrow",
        '⇐' => "\\Leftarrow",
        '⇔' => "\\Leftrightarrow",
        '↦' => "\\mapsto",
        '∈' => "\\in",
        '∉' => "\\notin",
        '∋' => "\\ni",
        '⊂' => "\\subset",
        '⊃' => "\\supset",
        '⊆' => "\\subseteq",
        '⊇' => "\\supseteq",
        '∪' => "\\cup",
        '∩' => "\\cap",
        '∖' => "\\setminus",
        '∅' => "\\emptyset",
        '∀' => "\\forall",
        '∃' => "\\exists",
        '¬' => "\\neg",
        '∧' => "\\wedge",
        '∨' => "\\vee",
        '∂' => "\\partial",
        '∇' => "\\nabla",
        '√' => "\\surd",
        '∑' => "\\sum",
        '∏' => "\\prod",
        '∫' => "\\int",
        '∮' => "\\oint",
        '′' => "'",
        '″' => "''",
        'ℝ' => "\\mathbb{R}",
        'ℕ' => "\\mathbb{N}",
        'ℤ' => "\\mathbb{Z}",
        'ℚ' => "\\mathbb{Q}",
        'ℂ' => "\\mathbb{C}",
        'ℓ' => "\\ell",
        'ℏ' => "\\hbar",
        '⊥' => "\\perp",
        '∥' => "\\parallel",
        '⊕' => "\\oplus",
        '⊗' => "\\otimes",
        '−' => "-",
        _ => return None,
    })
}
