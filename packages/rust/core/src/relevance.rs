//! Relevance expression checking through the external QnA evaluator.
//!
//! Validation is diagnostic only: evaluator errors are logged as warnings and
//! the expression is still emitted. When the evaluator binary is absent the
//! check is skipped entirely.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};

/// Outcome of checking one relevance expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevanceCheck {
    /// Always `true`; findings never block document assembly.
    pub ok: bool,
    /// Evaluator error (`E:` line) or invocation failure, if any.
    pub error_message: Option<String>,
}

impl RelevanceCheck {
    fn passed() -> Self {
        Self {
            ok: true,
            error_message: None,
        }
    }

    fn warned(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            error_message: Some(message.into()),
        }
    }
}

/// Checks a relevance expression for syntax or semantic errors.
pub trait RelevanceValidator {
    fn validate(&self, expression: &str) -> RelevanceCheck;
}

/// Used when no evaluator is installed: every expression passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipValidation;

impl RelevanceValidator for SkipValidation {
    fn validate(&self, _expression: &str) -> RelevanceCheck {
        RelevanceCheck::passed()
    }
}

/// Runs the QnA evaluator, feeding the expression on stdin and reading
/// `KEY: VALUE` lines from stdout. Only the `E` key is interpreted.
#[derive(Debug, Clone)]
pub struct QnaValidator {
    program: PathBuf,
    args: Vec<String>,
}

impl QnaValidator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments passed to the evaluator.
    #[cfg(test)]
    fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn run(&self, expression: &str) -> std::io::Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        feed_stdin(&mut child, expression)?;

        let output = child.wait_with_output()?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Write `input` to the child's stdin and close it. On failure the child is
/// killed and reaped before the error is returned.
fn feed_stdin(child: &mut Child, input: &str) -> std::io::Result<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    if let Err(e) = stdin.write_all(input.as_bytes()) {
        drop(stdin);
        let _ = child.kill();
        let _ = child.wait();
        return Err(e);
    }
    Ok(())
}

impl RelevanceValidator for QnaValidator {
    fn validate(&self, expression: &str) -> RelevanceCheck {
        match self.run(expression) {
            Ok(stdout) => match evaluator_error(&stdout) {
                Some(message) => {
                    warn!(relevance = expression, error = %message, "relevance error");
                    RelevanceCheck::warned(message)
                }
                None => {
                    debug!(relevance = expression, "relevance ok");
                    RelevanceCheck::passed()
                }
            },
            Err(e) => {
                warn!(evaluator = %self.program.display(), error = %e, "relevance evaluator failed");
                RelevanceCheck::warned(format!("{}: {e}", self.program.display()))
            }
        }
    }
}

/// Pick the evaluator: QnA when `qna_path` is an existing file, otherwise skip.
pub fn validator_for(qna_path: &Path) -> Box<dyn RelevanceValidator + Send> {
    if qna_path.is_file() {
        Box::new(QnaValidator::new(qna_path))
    } else {
        debug!(path = %qna_path.display(), "QnA not installed, relevance validation skipped");
        Box::new(SkipValidation)
    }
}

/// Parse `KEY: VALUE` lines. Lines without a colon are ignored.
pub fn parse_evaluator_output(stdout: &str) -> Vec<(String, String)> {
    stdout
        .trim()
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// The last non-empty `E` value, if any.
fn evaluator_error(stdout: &str) -> Option<String> {
    parse_evaluator_output(stdout)
        .into_iter()
        .rev()
        .find(|(key, value)| key == "E" && !value.is_empty())
        .map(|(_, value)| value)
}
