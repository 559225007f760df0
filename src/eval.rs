use tracing::debug;

use crate::builtins::{self, BuiltinCommandContext, BuiltinEffect};
use crate::jobs::Job;
use crate::parser::{self, ParseError};
use crate::process;
use crate::shell::Shell;

/// What the main loop should do after a line was handled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LineEffect {
    Continue,
    Exit,
}

/// Handle one trimmed, comment-stripped input line: dispatch to a builtin
/// if the first token names one (skipping the parser entirely), otherwise
/// parse, create a job, and launch it.
///
/// Errors escaping this function are fatal launch or terminal failures;
/// the caller terminates the shell.
pub fn run_line(shell: &mut Shell, line: &str) -> anyhow::Result<LineEffect> {
    if let Some(name) = line.split_whitespace().next() {
        if let Some(builtin) = builtins::builtin_command(name) {
            debug!("dispatching builtin: {}", name);
            let effect = builtin.run(&mut BuiltinCommandContext { line, shell })?;
            return Ok(match effect {
                BuiltinEffect::Continue => LineEffect::Continue,
                BuiltinEffect::ExitShell => LineEffect::Exit,
            });
        }
    }

    let pipeline = match parser::parse(line) {
        Ok(pipeline) => pipeline,
        Err(ParseError::Empty) => return Ok(LineEffect::Continue),
        Err(ParseError::Fatal(err)) => {
            debug!("parse error: {}", err);
            return Ok(LineEffect::Continue);
        }
    };

    let id = shell.jobs.insert(Job::new(pipeline));
    process::exec_job(shell, id)?;

    Ok(LineEffect::Continue)
}
