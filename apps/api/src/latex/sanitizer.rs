//! LaTeX sanitation: best-effort repair of model-generated LaTeX.
//!
//! This is a heuristic pass, not a parser. Every function here is total: it
//! never panics and always returns a string. Removing text can join its
//! neighbours into new matches, so `sanitize_latex` repeats the passes until the
//! source stops changing. Later stages may run it again on sanitized source.
//!
//! Order within one round:
//! 1. neutralize shell-escape / file-write primitives
//! 2. drop inline `%` comments (a one-line document would otherwise be truncated)
//! 3. collapse doubled line-break escapes
//! 4. fix known model typos
//! 5. balance `itemize` environments
//! 6. strip `\hrulefill` redefinitions
//! 7. drop a trailing period after `\end{document}`
//! 8. drop trailing periods from placeholder links
//! 9. scrub any shell-escape primitive the earlier removals spelled out

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Replacement for neutralized commands. Step 2 removes the marker together
/// with the command's argument text.
const DISABLED_COMMAND_MARKER: &str = "% disabled command";

/// Rounds are capped; real documents settle in two or three.
const MAX_SANITIZE_ROUNDS: usize = 16;

const ITEMIZE_BEGIN: &str = r"\begin{itemize}";
const ITEMIZE_END: &str = r"\end{itemize}";

static LEADING_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*`{3,}[A-Za-z0-9_+-]*").expect("Invalid leading fence regex pattern")
});
static FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`{3,}").expect("Invalid fence regex pattern"));
static BOUNDARY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<<<|>>>").expect("Invalid boundary marker regex pattern"));

static DOCUMENT_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\\documentclass.*\\end\{document\}").expect("Invalid document regex pattern")
});

static DANGEROUS_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\immediate\s*\\write\d*|\\write18").expect("Invalid dangerous command regex")
});
static BACKSLASH_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\{4,}").expect("Invalid backslash run regex pattern"));
static MISSPELLED_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\hrulefil\b").expect("Invalid rule typo regex pattern"));
static RULE_MISSING_BACKSLASH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\rule\{\s*(linewidth|textwidth|columnwidth)\s*\}")
        .expect("Invalid rule width regex pattern")
});
static LIST_STRUCTURE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\begin\{itemize\}|\\end\{itemize\}|\\section\b|\\end\{document\}")
        .expect("Invalid list structure regex pattern")
});
static RULE_REDEFINITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:re)?newcommand\*?\s*(?:\{\s*\\hrulefill\s*\}|\\hrulefill\b)")
        .expect("Invalid rule redefinition regex pattern")
});
static END_DOCUMENT_PERIOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\end\{document\}(?:\s*\.)+").expect("Invalid end document regex pattern")
});
static PLACEHOLDER_LINKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\\href\{(mailto:[^}\s]*?)\.+\}",
        r"\\href\{((?:https?://)?(?:www\.)?linkedin\.com[^}\s]*?)\.+\}",
        r"\\href\{((?:https?://)?(?:www\.)?github\.com[^}\s]*?)\.+\}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid placeholder link regex pattern"))
    .collect()
});

/// Removes markdown code fences (with optional language tag) and the `<<<` / `>>>`
/// boundary markers used in prompts, then trims.
pub fn strip_markdown_fences(input: &str) -> String {
    // Removing one marker can join the pieces of another (`<<`+`<`), so repeat
    // until nothing changes. Every round that changes the text shortens it.
    let mut text = input.to_string();
    loop {
        let stripped = strip_markers_once(&text);
        if stripped == text {
            break;
        }
        text = stripped;
    }
    text.trim().to_string()
}

fn strip_markers_once(text: &str) -> String {
    let text = BOUNDARY_MARKER.replace_all(text, "");
    let text = LEADING_FENCE.replace(&text, "");
    FENCE.replace_all(&text, "").into_owned()
}

/// Returns the span from the first `\documentclass` through the last
/// `\end{document}`, or the input unchanged when there is no such span.
pub fn extract_latex_document(input: &str) -> &str {
    DOCUMENT_SPAN
        .find(input)
        .map(|m| m.as_str())
        .unwrap_or(input)
}

/// Runs every repair pass over `input`. Empty input yields an empty string.
pub fn sanitize_latex(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let mut text = input.to_string();
    for _ in 0..MAX_SANITIZE_ROUNDS {
        let next = sanitize_round(&text);
        if next == text {
            break;
        }
        text = next;
    }
    text
}

fn sanitize_round(input: &str) -> String {
    let text = neutralize_dangerous_commands(input);
    let text = strip_inline_comments(&text);
    let text = collapse_doubled_line_breaks(&text);
    let text = fix_known_typos(&text);
    let text = balance_itemize(&text);
    let text = strip_rule_redefinitions(&text);
    let text = strip_period_after_end_document(&text);
    let text = normalize_placeholder_links(&text);
    scrub_dangerous_commands(text)
}

/// Escapes the ten LaTeX special characters for verbatim inclusion.
///
/// Maps one character at a time, so the braces emitted for `\textbackslash{}`
/// are never escaped a second time.
pub fn escape_latex(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 4);
    for c in input.chars() {
        match c {
            '\\' => out.push_str(r"\textbackslash{}"),
            '{' => out.push_str(r"\{"),
            '}' => out.push_str(r"\}"),
            '$' => out.push_str(r"\$"),
            '#' => out.push_str(r"\#"),
            '%' => out.push_str(r"\%"),
            '&' => out.push_str(r"\&"),
            '_' => out.push_str(r"\_"),
            '^' => out.push_str(r"\textasciicircum{}"),
            '~' => out.push_str(r"\textasciitilde{}"),
            other => out.push(other),
        }
    }
    out
}

/// `\write18` and `\immediate\write` can run shell commands or write files
/// when the engine allows it.
fn neutralize_dangerous_commands(input: &str) -> String {
    DANGEROUS_COMMAND
        .replace_all(input, DISABLED_COMMAND_MARKER)
        .into_owned()
}

/// Deletes every remaining match outright. Each deletion shortens the text, so
/// this ends, and the result never contains a match.
fn scrub_dangerous_commands(mut text: String) -> String {
    while DANGEROUS_COMMAND.is_match(&text) {
        text = DANGEROUS_COMMAND.replace_all(&text, "").into_owned();
    }
    text
}

/// Drops a `%` and the text after it up to the next command or line end.
///
/// A `%` is escaped only behind an odd run of backslashes; after `\\` (a line
/// break) it starts a comment.
fn strip_inline_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut backslashes = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '%' if backslashes % 2 == 0 => {
                while chars.next_if(|&next| next != '\\' && next != '\n').is_some() {}
                backslashes = 0;
            }
            '\\' => {
                backslashes += 1;
                out.push(c);
            }
            _ => {
                backslashes = 0;
                out.push(c);
            }
        }
    }
    out
}

/// Runs of four or more backslashes become `\\` (even runs) or `\\\` (odd runs,
/// where the last backslash starts a command).
fn collapse_doubled_line_breaks(input: &str) -> String {
    BACKSLASH_RUN
        .replace_all(input, |caps: &Captures| {
            if caps[0].len() % 2 == 0 {
                "\\\\"
            } else {
                "\\\\\\"
            }
        })
        .into_owned()
}

fn fix_known_typos(input: &str) -> String {
    let text = MISSPELLED_RULE.replace_all(input, r"\hrulefill");
    RULE_MISSING_BACKSLASH
        .replace_all(&text, r"\rule{\${1}}")
        .into_owned()
}

/// Closes `itemize` lists left open before a `\section` or `\end{document}`
/// and drops `\end{itemize}` tokens that have nothing to close.
fn balance_itemize(input: &str) -> String {
    let mut balancer = ItemizeBalancer::default();
    for line in input.split('\n') {
        balancer.feed(line);
    }
    balancer.finish()
}

/// Line-oriented state machine; the only state is the number of open lists.
#[derive(Debug, Default)]
struct ItemizeBalancer {
    open: usize,
    lines: Vec<String>,
}

impl ItemizeBalancer {
    fn feed(&mut self, line: &str) {
        let mut current = String::with_capacity(line.len());
        let mut cursor = 0;
        let mut dropped_stray = false;

        for token in LIST_STRUCTURE_TOKEN.find_iter(line) {
            current.push_str(&line[cursor..token.start()]);
            cursor = token.end();
            match token.as_str() {
                ITEMIZE_BEGIN => self.open += 1,
                ITEMIZE_END if self.open == 0 => {
                    dropped_stray = true;
                    continue;
                }
                ITEMIZE_END => self.open -= 1,
                _ => self.close_open_lists(&mut current),
            }
            current.push_str(token.as_str());
        }
        current.push_str(&line[cursor..]);

        if dropped_stray && current.trim().is_empty() {
            return;
        }
        self.lines.push(current);
    }

    /// Emits one `\end{itemize}` line per open list ahead of the pending text.
    fn close_open_lists(&mut self, current: &mut String) {
        if self.open == 0 {
            return;
        }
        if !current.trim().is_empty() {
            self.lines.push(current.trim_end().to_string());
            current.clear();
        }
        for _ in 0..self.open {
            self.lines.push(ITEMIZE_END.to_string());
        }
        self.open = 0;
    }

    fn finish(self) -> String {
        self.lines.join("\n")
    }
}

/// Removes `\newcommand` / `\renewcommand` definitions of `\hrulefill`,
/// including the whole line when nothing else is left on it.
fn strip_rule_redefinitions(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(m) = RULE_REDEFINITION.find(rest) {
        out.push_str(&rest[..m.start()]);
        let end = definition_end(rest, m.end());
        rest = &rest[end..];

        let line_head = out.rfind('\n').map_or(0, |i| i + 1);
        let line_tail = rest.find('\n').unwrap_or(rest.len());
        if out[line_head..].trim().is_empty() && rest[..line_tail].trim().is_empty() {
            out.truncate(line_head);
            rest = match rest[line_tail..].strip_prefix('\n') {
                Some(after) => after,
                // Last line: drop the newline that ended the previous line instead.
                None => {
                    if out.ends_with('\n') {
                        out.pop();
                    }
                    ""
                }
            };
        }
    }
    out.push_str(rest);
    out
}

/// Byte offset just past a definition's optional `[n]`/`[default]` arguments
/// and its brace-balanced body.
fn definition_end(text: &str, mut pos: usize) -> usize {
    loop {
        let rest = &text[pos..];
        let trimmed = rest.trim_start();
        let skipped = rest.len() - trimmed.len();

        if trimmed.starts_with('[') {
            match trimmed.find(']') {
                Some(close) => pos += skipped + close + 1,
                None => return text.len(),
            }
        } else if trimmed.starts_with('{') {
            return pos + skipped + balanced_group_len(trimmed);
        } else {
            return pos;
        }
    }
}

/// Length of the `{...}` group at the start of `s`, or all of `s` if unclosed.
fn balanced_group_len(s: &str) -> usize {
    let mut depth = 0usize;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }
    s.len()
}

fn strip_period_after_end_document(input: &str) -> String {
    END_DOCUMENT_PERIOD
        .replace_all(input, r"\end{document}")
        .into_owned()
}

fn normalize_placeholder_links(input: &str) -> String {
    PLACEHOLDER_LINKS
        .iter()
        .fold(input.to_string(), |text, pattern| {
            pattern.replace_all(&text, r"\href{${1}}").into_owned()
        })
}
