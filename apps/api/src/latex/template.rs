//! Deterministic fallback document used when no provider produced usable LaTeX.

use crate::latex::sanitizer::{escape_latex, sanitize_latex};

const FALLBACK_PREAMBLE: &str = "\\documentclass[11pt]{article}\n\
\\usepackage[margin=0.75in]{geometry}\n\
\\usepackage[T1]{fontenc}\n\
\\pagestyle{empty}\n\
\\setlength{\\parindent}{0pt}\n\
\\setlength{\\parskip}{4pt}\n";

/// Wraps the raw résumé text in a one-section document.
///
/// Each non-blank input line becomes its own paragraph. The result always
/// matches `\documentclass ... \end{document}`.
pub fn fallback_document(source_text: &str) -> String {
    let body = source_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(escape_latex)
        .collect::<Vec<_>>()
        .join("\n\n");

    let document = format!(
        "{FALLBACK_PREAMBLE}\\begin{{document}}\n\\section*{{Resume}}\n{body}\n\\end{{document}}\n"
    );
    sanitize_latex(&document)
}
