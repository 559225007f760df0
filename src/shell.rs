use nix::sys::signal::{killpg, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::termios::{tcgetattr, Termios};
use nix::unistd::{getpgrp, getpid, setpgid, tcgetpgrp, tcsetpgrp, Pid};
use tracing::debug;

use crate::jobs::JobTable;
use crate::process::{ProcessError, SHELL_TERMINAL};

/// All process-wide shell state, constructed once at startup and threaded
/// through every component.
///
/// Dropping the shell runs the shutdown sequence, so every path out of the
/// main loop (end of input, `exit`, a fatal error, a panic unwind) cancels
/// and reaps the remaining jobs.
pub struct Shell {
    pub interactive: bool,
    /// Count of `-d` flags; nonzero enables debug diagnostics on stderr.
    pub debug: u32,
    /// `-t`: report per-job resource usage on completion.
    pub rusage: bool,
    pub shell_pgid: Pid,
    /// Terminal modes captured at startup, reinstated whenever the shell
    /// reclaims the terminal. `None` when not interactive.
    pub shell_termios: Option<Termios>,
    pub jobs: JobTable,
    last_exit_code: i32,
}

impl Shell {
    pub fn new(debug: u32, rusage: bool) -> Shell {
        Shell {
            interactive: false,
            debug,
            rusage,
            shell_pgid: getpid(),
            shell_termios: None,
            jobs: JobTable::new(),
            last_exit_code: 0,
        }
    }

    #[inline]
    pub fn last_exit_code(&self) -> i32 {
        self.last_exit_code
    }

    pub fn set_last_exit_code(&mut self, code: i32) {
        self.last_exit_code = code;
    }

    /// Take control of the terminal and assume the interactive signal
    /// posture.
    ///
    /// Waits (via `SIGTTIN` against our own group) until the shell is the
    /// terminal's foreground group, then ignores the job-control signals,
    /// moves the shell into its own process group, puts that group in the
    /// foreground, and saves the terminal modes for later reinstatement.
    /// Children undo the ignore dispositions before exec.
    pub fn setup_interactive(&mut self) -> Result<(), ProcessError> {
        loop {
            let pgrp = getpgrp();
            let foreground = tcgetpgrp(SHELL_TERMINAL)
                .map_err(|errno| ProcessError::sys("tcgetpgrp", errno))?;
            if foreground == pgrp {
                break;
            }
            killpg(pgrp, Signal::SIGTTIN).map_err(|errno| ProcessError::sys("kill", errno))?;
        }

        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::SA_RESTART, SigSet::empty());
        for signal in [
            Signal::SIGINT,
            Signal::SIGQUIT,
            Signal::SIGTSTP,
            Signal::SIGTTIN,
            Signal::SIGTTOU,
        ] {
            unsafe { sigaction(signal, &ignore) }
                .map_err(|errno| ProcessError::sys("sigaction", errno))?;
        }

        let pgid = getpid();
        setpgid(pgid, pgid).map_err(|errno| ProcessError::sys("setpgid", errno))?;
        tcsetpgrp(SHELL_TERMINAL, pgid)
            .map_err(|errno| ProcessError::sys("tcsetpgrp", errno))?;

        self.shell_pgid = pgid;
        self.shell_termios = Some(
            tcgetattr(SHELL_TERMINAL).map_err(|errno| ProcessError::sys("tcgetattr", errno))?,
        );
        self.interactive = true;

        debug!(pgid = pgid.as_raw(), "interactive setup complete");
        Ok(())
    }
}

impl Drop for Shell {
    fn drop(&mut self) {
        debug!("shutting down: canceling and reaping all jobs");
        self.jobs.cancel_all();
        self.jobs.wait_for_all();
    }
}
