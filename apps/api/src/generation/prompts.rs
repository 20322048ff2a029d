// Prompt template for LaTeX résumé generation. Shared by every provider.

/// Generation prompt. Replace `{resume_text}` before sending.
///
/// The résumé text sits between `<<<` and `>>>`; models sometimes echo those
/// markers, which fence stripping removes.
pub const RESUME_LATEX_PROMPT_TEMPLATE: &str = r#"Rewrite the resume below as a single-page LaTeX document.

ATS FORMATTING RULES:
- Single column. No tables, text boxes, images, icons or multi-column layouts.
- Standard section headings only: Summary, Experience, Education, Projects, Skills, Certifications.
- Use \section*{...} for headings and itemize lists for bullet points.
- Dates right-aligned with \hfill on the same line as the role or degree.
- Plain hyperlinks via \href{...}{...} for email, LinkedIn and GitHub.
- Keep every fact from the source. Do NOT invent employers, dates, degrees or metrics.

PREAMBLE: use exactly this preamble and no other packages:
\documentclass[10pt]{article}
\usepackage[margin=0.6in]{geometry}
\usepackage[T1]{fontenc}
\usepackage{enumitem}
\usepackage[hidelinks]{hyperref}
\pagestyle{empty}
\setlist[itemize]{leftmargin=*, itemsep=1pt, topsep=2pt}

OUTPUT RULES:
- Return pure LaTeX only, starting with \documentclass and ending with \end{document}.
- No commentary, no markdown, no code fences.
- No LaTeX comments: never use the % character except as \% inside text.
- Escape special characters in text: \& \% \$ \# \_
- Close every \begin{itemize} with \end{itemize} before the next section.

LENGTH: scale the content so it fills one page naturally. Expand terse bullets
with detail present in the source; condense long ones. Never exceed one page.

RESUME TEXT:
<<<
{resume_text}
>>>
"#;

pub fn build_generation_prompt(resume_text: &str) -> String {
    RESUME_LATEX_PROMPT_TEMPLATE.replace("{resume_text}", resume_text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_source_between_markers() {
        let prompt = build_generation_prompt("  Jane Doe\nEngineer  ");
        assert!(prompt.contains("<<<\nJane Doe\nEngineer\n>>>"));
        assert!(!prompt.contains("{resume_text}"));
    }
}
