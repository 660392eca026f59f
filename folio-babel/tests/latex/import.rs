use crate::common::{convert, convert_with, outline, parse};
use folio_babel::convert::ConvertOptions;
use folio_babel::formats::latex::LatexFormat;
use folio_babel::ir::WarningKind;
use folio_babel::tree::BlockType;

const ARTICLE: &str = r"\documentclass{article}
\title{Folds and Loops}
\begin{document}
\maketitle
\begin{abstract}
We study folds.
\end{abstract}
\section{Background}
Prior work is \emph{sparse}.
\begin{equation}
E = mc^2
\end{equation}
\subsection{Definitions}
\begin{lemma}[Small]
Every fold \textbf{halts}.
\end{lemma}
\section{Results}
\begin{enumerate}
\item First
\item Second
\end{enumerate}
\begin{thebibliography}{9}
\bibitem{knuth84} D. Knuth. Literate Programming.
\end{thebibliography}
\end{document}
";

#[test]
fn article_becomes_a_section_tree() {
    let doc = parse(&LatexFormat, ARTICLE.as_bytes());
    let result = convert(&doc);
    let tree = &result.document;

    assert_eq!(tree.title, "Folds and Loops");
    assert_eq!(
        outline(tree),
        vec!["Untitled Section", "Background", "Definitions", "Results"]
    );
    assert_eq!(tree.sections[0].level, 0);
    assert_eq!(tree.sections[0].blocks[0].block_type, BlockType::Abstract);
    assert_eq!(
        tree.sections[0].blocks[0].content,
        "\\begin{abstract}\nWe study folds.\n\\end{abstract}"
    );

    let background = &tree.sections[1];
    assert_eq!(background.blocks[0].content, "Prior work is \\textit{sparse}.");
    assert_eq!(
        background.blocks[1].content,
        "\\begin{equation}\nE = mc^2\n\\end{equation}"
    );
    let lemma = &background.children[0].blocks[0];
    assert_eq!(lemma.content, "\\begin{lemma}[Small]\nEvery fold \\textbf{halts}.\n\\end{lemma}");
    assert_eq!(lemma.attribute("kind"), Some("lemma"));

    let results: Vec<&str> = tree.sections[2]
        .blocks
        .iter()
        .map(|b| b.content.as_str())
        .collect();
    assert_eq!(
        results,
        vec![
            "\\item First",
            "\\item Second",
            "\\bibitem{knuth84} D. Knuth. Literate Programming."
        ]
    );
    assert_eq!(result.statistics.equations, 1);
    assert_eq!(result.statistics.max_depth, 2);
}

#[test]
fn deep_headings_are_demoted_with_one_warning() {
    let source = "\\section{A}\n\\subsection{B}\n\\subsubsection{C}\n\\paragraph{D}\nText.\n";
    let doc = parse(&LatexFormat, source.as_bytes());
    let result = convert_with(
        &doc,
        ConvertOptions {
            max_section_depth: 2,
            ..Default::default()
        },
    );
    assert_eq!(outline(&result.document), vec!["A", "B"]);
    let demoted: Vec<&str> = result.document.sections[0].children[0]
        .blocks
        .iter()
        .filter(|b| b.attribute("demoted_level").is_some())
        .map(|b| b.content.as_str())
        .collect();
    assert_eq!(demoted, vec!["\\textbf{C}", "\\textbf{D}"]);
    let warnings = result
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::HeadingDemoted)
        .count();
    assert_eq!(warnings, 1);
}
