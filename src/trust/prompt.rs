//! Operator confirmation for changed peer keys.

use std::io::{self, BufRead, Write};

/// Answer to a key-change confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Yes,
    No,
}

/// Blocking yes/no confirmation shown when a stored key no longer matches
/// the one the peer presented.
///
/// `None` means no answer could be obtained (input closed, unattended
/// run); callers treat that as a decline. Implementations may block; the
/// trust gate runs them off the async runtime.
pub trait TrustPrompt: Send + Sync {
    fn confirm_key_change(&self, identity: &str, summary: &str) -> Option<PromptAnswer>;
}

/// Interactive prompt on the controlling terminal.
///
/// Writes to stderr and reads answers line by line from stdin until it
/// sees `yes` or `no` (case-insensitive). End of input means no answer.
pub struct StdinPrompt;

impl TrustPrompt for StdinPrompt {
    fn confirm_key_change(&self, identity: &str, summary: &str) -> Option<PromptAnswer> {
        let stderr = io::stderr();
        let mut err = stderr.lock();
        let _ = writeln!(
            err,
            "\nThe public key presented by '{identity}' differs from the one stored\n\
             from an earlier session. The server may have been reinstalled, or the\n\
             connection may be intercepted.\n\n{summary}\n"
        );

        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            let _ = write!(err, "Trust the new key and replace the stored one? (yes/no) ");
            let _ = err.flush();
            let line = match lines.next() {
                Some(Ok(line)) => line,
                _ => return None,
            };
            match line.trim() {
                answer if answer.eq_ignore_ascii_case("yes") => return Some(PromptAnswer::Yes),
                answer if answer.eq_ignore_ascii_case("no") => return Some(PromptAnswer::No),
                _ => {}
            }
        }
    }
}

/// Non-interactive prompt with a predetermined answer, for unattended runs.
pub struct FixedPrompt {
    answer: Option<PromptAnswer>,
}

impl FixedPrompt {
    pub fn new(answer: Option<PromptAnswer>) -> Self {
        Self { answer }
    }
}

impl TrustPrompt for FixedPrompt {
    fn confirm_key_change(&self, _identity: &str, _summary: &str) -> Option<PromptAnswer> {
        self.answer
    }
}
