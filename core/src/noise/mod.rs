//! Filter terminal noise from CLI agent output.
//!
//! Removes spinners, TUI chrome, progress bars, status lines, and other
//! non-content output that should not appear in chat messages.

use std::sync::OnceLock;

use regex::Regex;

macro_rules! lazy_regex {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pat).expect("static noise pattern must compile"))
        }
    };
}

lazy_regex!(spinner_braille_re, r"[\x{2800}-\x{28ff}]");
lazy_regex!(
    spinner_line_re,
    r"^[\s]*[\x{2800}-\x{28ff}\x{2800}|/\\\x{25d0}\x{25d1}\x{25d2}\x{25d3}\x{25cf}\x{25cb}\x{25c9}]\s+.{0,60}\.{0,3}\s*$"
);
lazy_regex!(
    box_drawing_re,
    r"^[\s\x{2500}-\x{257f}\x{2580}-\x{259f}]+$"
);
lazy_regex!(
    decorative_line_re,
    r"^[\s\x{2500}-\x{257f}\x{2580}-\x{259f}\x{2800}-\x{28ff}\-=_~*+]+$"
);
lazy_regex!(block_elements_re, r"^[\s\x{2591}\x{2592}\x{2593}\x{2588}\x{2580}-\x{259f}]+$");
lazy_regex!(status_mem_re, r"(?i)\b\d+(?:\.\d+)?\s*(?:kb|mb|gb)\b");
lazy_regex!(status_rate_re, r"(?i)\b\d+(?:\.\d+)?\s*(?:tok/s|tokens?/s|it/s|t/s)\b");
lazy_regex!(progress_pct_re, r"\b\d{1,3}%");
lazy_regex!(
    tui_hint_re,
    r"(?i)type\s+(a\s+)?(?:your\s+)?message|@path/to/file|press\s+enter|enter\s+to\s+confirm|esc\s+to\s+(cancel|undo|close)|ctrl[+\-]c\s+to\s+(quit|exit|cancel)|/help\s+for\s+commands|security\s+guide"
);
lazy_regex!(
    model_status_re,
    r"(?i)(?:/model\s+\S+|no\s+sandbox|auto-?compact|\bcontext\s*:\s*\d+|\bcost\s*:\s*\$[\d.]+)"
);
lazy_regex!(file_hint_re, r"(?i)^\s*\d+\s+\S+\s+files?\s*$");
lazy_regex!(thinking_re, r"^[\s.\x{2026}\x{22ef}\x{00b7}\x{2022}]+$");
lazy_regex!(cursor_only_re, r"^[\s\x{276f}>$\x{203a}\x{00bb}\x{25b8}\x{25ba}\x{2192}\-_|]*$");

lazy_regex!(
    codex_pasted_re,
    r"(?i)^\s*\x{203a}?\s*(?:\[)?\s*Pasted\s+Content\s+\d+\s+chars?\s*(?:\])?\s*$"
);
lazy_regex!(
    codex_pasted_repeated_re,
    r"(?i)^\s*(?:\x{203a}?\s*(?:\[)?\s*Pasted\s+Content\s+\d+\s+chars?\s*(?:\])?\s*)+$"
);
lazy_regex!(codex_context_re, r"(?i)^\s*\d{1,3}%\s+context\s+left\s*$");

lazy_regex!(
    claude_trust_re,
    r"(?i)yes,?\s+i\s+trust\s+this\s+folder|no,?\s+exit|quick\s+safety\s+check|is\s+this\s+a\s+project\s+you\s+created|claude\s+code'?l?l?\s+be\s+able\s+to\s+read|accessing\s+workspace|well-known\s+open\s+source"
);

lazy_regex!(
    gemini_chrome_re,
    r"(?i)logged\s+in\s+with\s+google|/auth\b|loaded\s+cached\s+credentials|hook\s+registry\s+initialized|this\s+folder\s+is\s+untrusted|project\s+settings.*will\s+not\s+be\s+applied|will\s+not\s+be\s+applied\s+for\s+this\s+folder|use\s+the\s+/permissions\s+command|\d+\s+GEMINI\.md\s+file"
);
lazy_regex!(
    gemini_status_bar_re,
    r"(?i)(?:untrusted|trusted)\s+.*(?:/model|Auto\s*\()"
);

pub fn is_noise_line(line: &str) -> bool {
    let stripped = line.trim();
    if stripped.is_empty() {
        return true;
    }

    if box_drawing_re().is_match(stripped)
        || decorative_line_re().is_match(stripped)
        || block_elements_re().is_match(stripped)
        || thinking_re().is_match(stripped)
        || cursor_only_re().is_match(stripped)
        || file_hint_re().is_match(stripped)
        || spinner_line_re().is_match(stripped)
    {
        return true;
    }

    if tui_hint_re().is_match(stripped) {
        return true;
    }

    if model_status_re().is_match(stripped)
        && (status_mem_re().is_match(stripped) || status_rate_re().is_match(stripped))
    {
        return true;
    }

    if codex_pasted_re().is_match(stripped)
        || codex_pasted_repeated_re().is_match(stripped)
        || codex_context_re().is_match(stripped)
    {
        return true;
    }

    if claude_trust_re().is_match(stripped) {
        return true;
    }

    if gemini_chrome_re().is_match(stripped) || gemini_status_bar_re().is_match(stripped) {
        return true;
    }

    false
}

/// True when every non-empty line of `text` is noise — the whole block
/// can be discarded.
pub fn is_repaint_noise(text: &str) -> bool {
    let meaningful = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter(|l| !is_noise_line(l))
        .count();
    meaningful == 0
}

/// Strip individual noise lines from a mixed block, leaving content lines
/// intact. Fenced code blocks are never filtered.
pub fn filter_noise_lines(text: &str) -> String {
    let mut result_lines = Vec::new();
    let mut in_code_block = false;

    for line in text.lines() {
        let stripped = line.trim();

        if stripped.starts_with("```") {
            in_code_block = !in_code_block;
            result_lines.push(line);
            continue;
        }

        if in_code_block {
            result_lines.push(line);
            continue;
        }

        if is_noise_line(line) {
            continue;
        }

        result_lines.push(line);
    }

    while matches!(result_lines.last(), Some(l) if l.trim().is_empty()) {
        result_lines.pop();
    }

    result_lines.join("\n")
}

/// Produce a normalized signature for deduplication: two blocks with the
/// same signature are the same content modulo spinner frame/timestamp churn.
pub fn normalize_signature(text: &str) -> String {
    static TIME_RE: OnceLock<Regex> = OnceLock::new();
    static BLOCK_RE: OnceLock<Regex> = OnceLock::new();
    static WS_RE: OnceLock<Regex> = OnceLock::new();
    let time_re = TIME_RE.get_or_init(|| Regex::new(r"\b\d{1,2}:\d{2}(?::\d{2})?\b").unwrap());
    let block_re = BLOCK_RE.get_or_init(|| Regex::new(r"[\x{2580}-\x{259f}]+").unwrap());
    let ws_re = WS_RE.get_or_init(|| Regex::new(r"\s+").unwrap());

    let mut normalized = text.to_lowercase();
    normalized = time_re.replace_all(&normalized, "<time>").into_owned();
    normalized = progress_pct_re().replace_all(&normalized, "<pct>").into_owned();
    normalized = status_mem_re().replace_all(&normalized, "<mem>").into_owned();
    normalized = status_rate_re().replace_all(&normalized, "<rate>").into_owned();
    normalized = spinner_braille_re().replace_all(&normalized, "").into_owned();
    normalized = block_re.replace_all(&normalized, " ").into_owned();
    normalized = ws_re.replace_all(&normalized, " ").trim().to_string();
    normalized.chars().take(800).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_is_noise() {
        assert!(is_noise_line("   "));
    }

    #[test]
    fn ordinary_sentence_is_not_noise() {
        assert!(!is_noise_line("Here is the fix for the bug in parser.rs"));
    }

    #[test]
    fn cursor_only_line_is_noise() {
        assert!(is_noise_line(">"));
        assert!(is_noise_line("❯"));
    }

    #[test]
    fn claude_trust_dialog_is_noise() {
        assert!(is_noise_line("Yes, I trust this folder"));
    }

    #[test]
    fn codex_pasted_content_echo_is_noise() {
        assert!(is_noise_line("› [Pasted Content 8905 chars]"));
    }

    #[test]
    fn filter_preserves_code_fence_contents() {
        let text = "intro\n```\n❯ looks like noise but is code\n```\noutro";
        let filtered = filter_noise_lines(text);
        assert!(filtered.contains("❯ looks like noise but is code"));
    }

    #[test]
    fn repaint_noise_detects_all_noise_block() {
        assert!(is_repaint_noise("❯\n   \n>"));
        assert!(!is_repaint_noise("❯\nactual content here"));
    }

    #[test]
    fn normalize_signature_collapses_timestamps() {
        let a = normalize_signature("12:34 thinking... 50% done 3.2mb 10 tok/s");
        let b = normalize_signature("12:35 thinking... 51% done 3.5mb 12 tok/s");
        assert_eq!(a, b);
    }
}
