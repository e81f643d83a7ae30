//! Snapshot-based response extraction for CLI agent terminals.
//!
//! Rather than parsing a stream of chunks, a full terminal snapshot is
//! taken on every poll and the response is located between known
//! start/end markers specific to each wrapped CLI.

use std::sync::OnceLock;

use regex::Regex;

use crate::agentdefs::AgentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Idle,
    Processing,
    Completed,
    WaitingUserAnswer,
    Error,
}

fn ansi_full_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\x1b\[[0-9;?]*[A-Za-z]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[()][0-9A-Za-z]|\x1bP[^\x1b]*\x1b\\",
        )
        .unwrap()
    })
}

fn ansi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap())
}

fn control_char_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f\x7f-\x9f]").unwrap())
}

pub fn strip_ansi(text: &str) -> String {
    ansi_full_re().replace_all(text, "").into_owned()
}

pub fn strip_control(text: &str) -> String {
    control_char_re().replace_all(text, "").into_owned()
}

pub fn get_terminal_state(agent: AgentKind, snapshot: &str) -> TerminalState {
    match agent {
        AgentKind::Claude => claude::get_status(snapshot),
        AgentKind::Codex => codex::get_status(snapshot),
        AgentKind::Gemini => gemini::get_status(snapshot),
    }
}

pub fn extract_response(agent: AgentKind, snapshot: &str) -> String {
    match agent {
        AgentKind::Claude => claude::extract_response(snapshot),
        AgentKind::Codex => codex::extract_response(snapshot),
        AgentKind::Gemini => gemini::extract_response(snapshot),
    }
}

mod claude {
    use super::*;

    fn response_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"\x{23fa}(?:\x1b\[[0-9;]*m)*\s+").unwrap())
    }
    fn processing_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r"[\x{2736}\x{2732}\x{273d}\x{273b}\x{00b7}\x{2733}].*\x{2026}.*\(esc to interrupt.*\)")
                .unwrap()
        })
    }
    fn idle_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r">\s*[\s\x{00a0}]").unwrap())
    }
    fn waiting_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"\x{276f}.*\d+\.").unwrap())
    }
    fn separator_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"-{8,}|\x{2500}{8,}").unwrap())
    }

    pub fn get_status(snapshot: &str) -> TerminalState {
        if snapshot.is_empty() {
            return TerminalState::Error;
        }
        if processing_re().is_match(snapshot) {
            return TerminalState::Processing;
        }
        if waiting_re().is_match(snapshot) {
            return TerminalState::WaitingUserAnswer;
        }
        if response_re().is_match(snapshot) && idle_re().is_match(snapshot) {
            return TerminalState::Completed;
        }
        if idle_re().is_match(snapshot) {
            return TerminalState::Idle;
        }
        TerminalState::Processing
    }

    pub fn extract_response(snapshot: &str) -> String {
        let matches: Vec<_> = response_re().find_iter(snapshot).collect();
        let Some(last_match) = matches.last() else {
            return String::new();
        };
        let remaining = &snapshot[last_match.end()..];

        let mut response_lines = Vec::new();
        for line in remaining.split('\n') {
            if idle_re().find(line).map(|m| m.start() == 0).unwrap_or(false)
                || separator_re().is_match(line)
            {
                break;
            }
            response_lines.push(line.trim());
        }

        if !response_lines.iter().any(|l| !l.is_empty()) {
            return String::new();
        }

        let joined = response_lines.join("\n");
        let joined = joined.trim();
        let stripped = ansi_re().replace_all(joined, "");
        strip_control(&stripped).trim().to_string()
    }
}

mod codex {
    use super::*;

    fn idle_end_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"(?m)^\s*(?:\x{276f}|\x{203a}|codex>)\s*\s*\z").unwrap())
    }
    fn assistant_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"(?mi)^(?:assistant|codex|agent)\s*:").unwrap())
    }
    fn user_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"(?mi)^You\b").unwrap())
    }
    fn waiting_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"(?m)^(?:Approve|Allow)\b.*\b(?:y/n|yes/no)\b").unwrap())
    }
    fn error_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r"(?m)^(?:Error:|ERROR:|Traceback \(most recent call last\):|panic:)").unwrap()
        })
    }

    pub fn get_status(snapshot: &str) -> TerminalState {
        if snapshot.is_empty() {
            return TerminalState::Error;
        }
        let clean = strip_ansi(snapshot);
        let tail: String = clean
            .lines()
            .rev()
            .take(25)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("\n");

        let last_user = user_re().find_iter(&clean).last();
        let after_user = match last_user {
            Some(m) => &clean[m.start()..],
            None => clean.as_str(),
        };
        let has_assistant = last_user.is_some() && assistant_re().is_match(after_user);
        let has_idle_end = idle_end_re().is_match(&clean);

        if last_user.is_some() && !has_assistant {
            if waiting_re().is_match(after_user) {
                return TerminalState::WaitingUserAnswer;
            }
            if error_re().is_match(after_user) {
                return TerminalState::Error;
            }
        } else if last_user.is_none() {
            if waiting_re().is_match(&tail) {
                return TerminalState::WaitingUserAnswer;
            }
            if error_re().is_match(&tail) {
                return TerminalState::Error;
            }
        }

        if has_idle_end {
            if last_user.is_some() && has_assistant {
                return TerminalState::Completed;
            }
            return TerminalState::Idle;
        }

        TerminalState::Processing
    }

    pub fn extract_response(snapshot: &str) -> String {
        let clean = strip_ansi(snapshot);
        let matches: Vec<_> = assistant_re().find_iter(&clean).collect();
        let Some(last_match) = matches.last() else {
            return String::new();
        };
        let start = last_match.end();
        let tail = &clean[start..];
        let end = match idle_end_re().find(tail) {
            Some(m) => start + m.start(),
            None => clean.len(),
        };
        clean[start..end].trim().to_string()
    }
}

mod gemini {
    use super::*;

    fn response_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"[\x{2726}\x{2727}]\s*").unwrap())
    }
    fn idle_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"(?m)(?:\x{276f}|>)\s*$").unwrap())
    }

    pub fn get_status(snapshot: &str) -> TerminalState {
        if snapshot.is_empty() {
            return TerminalState::Error;
        }
        let clean = strip_ansi(snapshot);
        let has_response = response_re().is_match(&clean);
        let has_idle = idle_re().is_match(&clean);
        if has_response && has_idle {
            TerminalState::Completed
        } else if has_idle {
            TerminalState::Idle
        } else {
            TerminalState::Processing
        }
    }

    pub fn extract_response(snapshot: &str) -> String {
        let clean = strip_ansi(snapshot);
        let matches: Vec<_> = response_re().find_iter(&clean).collect();
        let Some(last_match) = matches.last() else {
            return strip_control(&clean).trim().to_string();
        };
        let remaining = &clean[last_match.end()..];

        let mut response_lines = Vec::new();
        for line in remaining.split('\n') {
            if idle_re().find(line).map(|m| m.start() == 0).unwrap_or(false) {
                break;
            }
            response_lines.push(line);
        }
        let joined = response_lines.join("\n");
        strip_control(joined.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_idle_with_no_response_is_idle() {
        let snap = "some preamble\n>  \n";
        assert_eq!(get_terminal_state(AgentKind::Claude, snap), TerminalState::Idle);
    }

    #[test]
    fn claude_completed_extracts_text() {
        let snap = "\u{23fa} Hello there\nmore text\n>  \n";
        assert_eq!(
            get_terminal_state(AgentKind::Claude, snap),
            TerminalState::Completed
        );
        let extracted = extract_response(AgentKind::Claude, snap);
        assert!(extracted.contains("Hello there"));
    }

    #[test]
    fn empty_snapshot_is_error_for_all_agents() {
        for agent in AgentKind::all() {
            assert_eq!(get_terminal_state(agent, ""), TerminalState::Error);
        }
    }

    #[test]
    fn gemini_fallback_extraction_without_marker() {
        let snap = "plain text with no marker";
        let extracted = extract_response(AgentKind::Gemini, snap);
        assert_eq!(extracted, "plain text with no marker");
    }

    #[test]
    fn codex_waiting_user_answer_detected() {
        let snap = "You: do the thing\nApprove this command? y/n\n";
        assert_eq!(
            get_terminal_state(AgentKind::Codex, snap),
            TerminalState::WaitingUserAnswer
        );
    }
}
