use std::io::{self, BufRead, Write};

use tracing::debug;

use crate::eval::{self, LineEffect};
use crate::process;
use crate::shell::Shell;

const PROMPT: &str = "smash> ";

/// The shell's driver: owns the shell state and the input source (the
/// terminal, or a script file).
pub struct SmashState {
    shell: Shell,
    input: Box<dyn BufRead>,
}

impl SmashState {
    pub fn new(shell: Shell, input: Box<dyn BufRead>) -> SmashState {
        SmashState { shell, input }
    }

    /// Run until end of input or `exit`, returning the process exit code.
    /// The shell is dropped on return, which runs the shutdown sequence.
    pub fn run(mut self) -> i32 {
        loop {
            // Pick up anything that finished, stopped, or continued since
            // the last iteration.
            process::reap_children(&mut self.shell);

            if self.shell.interactive {
                print!("{PROMPT}");
                if io::stdout().flush().is_err() {
                    return 1;
                }
            }

            let mut buf = String::new();
            match self.input.read_line(&mut buf) {
                Ok(0) => return 0,
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    smash_err!("failed to read input: {}", err);
                    return 1;
                }
            }
            debug!("read input: '{}'", buf.trim_end_matches('\n'));

            // Children may have finished while we were blocked reading.
            process::reap_children(&mut self.shell);

            let line = buf.trim();
            let line = line.split('#').next().unwrap_or("");
            if line.is_empty() {
                continue;
            }

            match eval::run_line(&mut self.shell, line) {
                Ok(LineEffect::Continue) => {}
                Ok(LineEffect::Exit) => return 0,
                Err(err) => {
                    smash_err!("{}", err);
                    return 1;
                }
            }
        }
    }
}
