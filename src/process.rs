use std::ffi::CString;
use std::os::unix::io::RawFd;

use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::libc;
use nix::sys::signal::{killpg, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::stat::Mode;
use nix::sys::termios::{tcgetattr, tcsetattr, SetArg};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{close, dup2, execvp, fork, getpid, pipe, setpgid, tcsetpgrp, ForkResult, Pid};
use thiserror::Error;
use tracing::debug;

use crate::expand;
use crate::jobs::{Job, JobId, JobStatus};
use crate::parser::Command;
use crate::shell::Shell;

/// The controlling terminal, always addressed through stdin.
pub(crate) const SHELL_TERMINAL: RawFd = 0;

#[derive(Debug, Error)]
pub enum ProcessError {
    /// The operation is not valid for the job's current status. Callers
    /// treat this as a no-op, reported only under `-d`.
    #[error("job is in incorrect state")]
    JobState,
    #[error("job is already in fg")]
    AlreadyForeground,
    #[error("no such job")]
    NoSuchJob,
    /// An OS failure during launching or terminal handoff. These leave
    /// process or terminal state inconsistent and terminate the shell.
    #[error("{call}() failed: {}", .errno.desc())]
    Sys { call: &'static str, errno: Errno },
}

impl ProcessError {
    pub fn sys(call: &'static str, errno: Errno) -> ProcessError {
        ProcessError::Sys { call, errno }
    }

    /// Whether this error must take the whole shell down (fork, pipe, and
    /// terminal handoff failures) rather than just fail the request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProcessError::Sys { .. })
    }
}

/// `waitpid`, optionally through `wait4` so the caller also gets the
/// reaped child's resource usage (nix has no `wait4` wrapper).
fn wait_for(
    target: Pid,
    flags: WaitPidFlag,
    with_rusage: bool,
) -> nix::Result<(WaitStatus, Option<libc::rusage>)> {
    if !with_rusage {
        return waitpid(target, Some(flags)).map(|status| (status, None));
    }

    let mut status: libc::c_int = 0;
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let reaped = unsafe {
        libc::wait4(
            target.as_raw(),
            &mut status as *mut libc::c_int,
            flags.bits(),
            &mut usage as *mut libc::rusage,
        )
    };

    match reaped {
        -1 => Err(Errno::last()),
        0 => Ok((WaitStatus::StillAlive, None)),
        pid => WaitStatus::from_raw(Pid::from_raw(pid), status).map(|ws| (ws, Some(usage))),
    }
}

/// Non-blocking reap of every child with a pending state change, applied
/// to the owning jobs. Runs at the top of each main-loop iteration and
/// again after the line read.
pub fn reap_children(shell: &mut Shell) {
    let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    let with_rusage = shell.rusage;
    let debug_enabled = shell.debug > 0;

    loop {
        match wait_for(Pid::from_raw(-1), flags, with_rusage) {
            Ok((WaitStatus::StillAlive, _)) | Err(Errno::ECHILD) => break,
            Err(Errno::EINTR) => continue,
            Err(errno) => {
                debug!("waitpid() failed while reaping: {}", errno);
                break;
            }
            Ok((status, usage)) => {
                let Some(pid) = status.pid() else { break };
                debug!(pid = pid.as_raw(), ?status, "reaped child");

                match shell.jobs.by_leader_mut(pid) {
                    Some(job) => {
                        job.update_status(status, debug_enabled);
                        if with_rusage && job.status.is_terminal() {
                            report_times(job, usage);
                        }
                    }
                    // Non-leader pipeline members are reaped without a
                    // status transition; only the leader drives the job.
                    None => debug!(pid = pid.as_raw(), "reaped pid with no owning job"),
                }
            }
        }
    }
}

/// `TIMES: real=<s.us> user=<s.us> sys=<s.us>` on stderr (`-t`).
fn report_times(job: &Job, usage: Option<libc::rusage>) {
    let Some(usage) = usage else { return };
    let real = job.started.elapsed();
    eprintln!(
        "TIMES: real={}.{}s user={}.{}s sys={}.{}s",
        real.as_secs(),
        real.subsec_micros(),
        usage.ru_utime.tv_sec,
        usage.ru_utime.tv_usec,
        usage.ru_stime.tv_sec,
        usage.ru_stime.tv_usec,
    );
}

/// Launch every command of the job's pipeline and then drive the job to
/// its first stop: foreground wait, background registration, or (when not
/// interactive) an unconditional blocking wait.
pub fn exec_job(shell: &mut Shell, id: JobId) -> Result<(), ProcessError> {
    let pipeline = shell
        .jobs
        .get(id)
        .ok_or(ProcessError::NoSuchJob)?
        .pipeline
        .clone();
    let background = pipeline.background;
    let interactive = shell.interactive;
    let last = pipeline.commands.len() - 1;

    let mut pgid: Option<Pid> = None;
    let mut next_stdin: Option<RawFd> = None;

    for (index, command) in pipeline.commands.iter().enumerate() {
        // The pipe feeding the next stage, created before the fork so both
        // sides inherit it.
        let pipe_fds = if index < last {
            Some(pipe().map_err(|errno| ProcessError::sys("pipe", errno))?)
        } else {
            None
        };
        let stdin_fd = next_stdin.take();
        let stdout_fd = pipe_fds.map(|(_, write)| write);

        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                let job_pgid = pgid.unwrap_or_else(getpid);
                // Only the next stage reads from the pipe just created.
                if let Some((read, _)) = pipe_fds {
                    let _ = close(read);
                }
                launch_child(
                    shell,
                    command,
                    job_pgid,
                    interactive,
                    interactive && !background && index == 0,
                    stdin_fd,
                    stdout_fd,
                );
            }
            Ok(ForkResult::Parent { child }) => {
                let job_pgid = *pgid.get_or_insert(child);
                if interactive {
                    // The child does the same setpgid on itself; doing it
                    // on both sides closes the race against its execvp.
                    let _ = setpgid(child, job_pgid);
                }
                debug!(
                    pid = child.as_raw(),
                    pgid = job_pgid.as_raw(),
                    "forked pipeline member"
                );
            }
            Err(errno) => return Err(ProcessError::sys("fork", errno)),
        }

        // Drop our copies so EOF propagates as stages finish.
        if let Some(fd) = stdin_fd {
            if let Err(errno) = close(fd) {
                debug!("close() failed on pipe read end: {}", errno);
            }
        }
        if let Some((read, write)) = pipe_fds {
            if let Err(errno) = close(write) {
                debug!("close() failed on pipe write end: {}", errno);
            }
            next_stdin = Some(read);
        }
    }

    let pgid = pgid.ok_or(ProcessError::JobState)?;
    if let Some(job) = shell.jobs.get_mut(id) {
        job.pgid = Some(pgid);
    }

    if !interactive {
        wait_for_job(shell, id)?;
        let code = shell.jobs.get(id).map_or(0, |job| job.exit_code);
        shell.set_last_exit_code(code);
        Ok(())
    } else if background {
        run_in_background(shell, id, false)
    } else {
        run_in_foreground(shell, id, false)
    }
}

/// Child-side setup between fork and exec. Never returns.
fn launch_child(
    shell: &Shell,
    command: &Command,
    pgid: Pid,
    interactive: bool,
    take_terminal: bool,
    stdin_fd: Option<RawFd>,
    stdout_fd: Option<RawFd>,
) -> ! {
    if interactive {
        let pid = getpid();
        if let Err(errno) = setpgid(pid, pgid) {
            smash_err!("setpgid() failed: {}", errno.desc());
            std::process::exit(1);
        }

        if take_terminal {
            if let Err(errno) = tcsetpgrp(SHELL_TERMINAL, pgid) {
                smash_err!(
                    "tcsetpgrp() failed to set foreground process: {}",
                    errno.desc()
                );
                std::process::exit(1);
            }
        }

        // The shell ignores the job-control signals; its children must not.
        let default = SigAction::new(SigHandler::SigDfl, SaFlags::SA_RESTART, SigSet::empty());
        for signal in [
            Signal::SIGINT,
            Signal::SIGQUIT,
            Signal::SIGTSTP,
            Signal::SIGTTIN,
            Signal::SIGTTOU,
            Signal::SIGCHLD,
        ] {
            if let Err(errno) = unsafe { sigaction(signal, &default) } {
                smash_err!("sigaction() failed: {}", errno.desc());
                std::process::exit(1);
            }
        }
    }

    // File redirections first; pipe ends after, so a pipe wins over a file
    // redirection on the same descriptor.
    if let Some(path) = &command.redirect_out {
        let fd = open_output_file(path, command.append_out);
        redirect_onto(fd, libc::STDOUT_FILENO);
    }
    if let Some(path) = &command.redirect_err {
        let fd = open_output_file(path, false);
        redirect_onto(fd, libc::STDERR_FILENO);
    }
    if let Some(path) = &command.redirect_in {
        let fd = match open(path.as_str(), OFlag::O_RDONLY, Mode::empty()) {
            Ok(fd) => fd,
            Err(errno) => {
                smash_err!("open() failed to open file: {}", errno.desc());
                std::process::exit(1);
            }
        };
        redirect_onto(fd, libc::STDIN_FILENO);
    }
    if let Some(fd) = stdin_fd {
        redirect_onto(fd, libc::STDIN_FILENO);
    }
    if let Some(fd) = stdout_fd {
        redirect_onto(fd, libc::STDOUT_FILENO);
    }

    if shell.debug > 0 {
        eprintln!("RUNNING: {}", command.argv.join(" "));
    }

    let argv = expand::expand_argv(shell, &command.argv);
    let argv: Vec<CString> = match argv.into_iter().map(CString::new).collect() {
        Ok(argv) => argv,
        Err(_) => {
            smash_err!("argument contains an interior NUL byte");
            std::process::exit(1);
        }
    };

    // execvp searches PATH for us.
    match execvp(&argv[0], &argv) {
        Ok(_) => unreachable!(),
        Err(errno) => {
            smash_err!("{}", errno.desc());
            std::process::exit(1);
        }
    }
}

/// Truncate-or-create for `>` and `2>`; `>>` opens for append and falls
/// back to creating the file when it does not exist yet. 0666 before the
/// umask, as files created by redirection conventionally are.
fn open_output_file(path: &str, append: bool) -> RawFd {
    let mode = Mode::S_IRUSR
        | Mode::S_IWUSR
        | Mode::S_IRGRP
        | Mode::S_IWGRP
        | Mode::S_IROTH
        | Mode::S_IWOTH;

    if append {
        match open(path, OFlag::O_WRONLY | OFlag::O_APPEND, mode) {
            Ok(fd) => return fd,
            Err(Errno::ENOENT) => {}
            Err(errno) => {
                smash_err!("open() failed: {}", errno.desc());
                std::process::exit(1);
            }
        }
    }

    match open(path, OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC, mode) {
        Ok(fd) => fd,
        Err(errno) => {
            smash_err!("open() failed to open file: {}", errno.desc());
            std::process::exit(1);
        }
    }
}

/// dup2 `fd` onto a standard descriptor and close the original.
fn redirect_onto(fd: RawFd, target: RawFd) {
    if let Err(errno) = dup2(fd, target) {
        smash_err!("dup2() failed to clone file descriptor: {}", errno.desc());
        std::process::exit(1);
    }
    if let Err(errno) = close(fd) {
        smash_err!("close() failed: {}", errno.desc());
        std::process::exit(1);
    }
}

/// Give the job the terminal (continuing it if suspended), wait for its
/// first state change, then take the terminal back.
pub fn run_in_foreground(shell: &mut Shell, id: JobId, cont: bool) -> Result<(), ProcessError> {
    debug!(%id, cont, "run_in_foreground");

    let (pgid, previous, saved_termios) = {
        let job = shell.jobs.get_mut(id).ok_or(ProcessError::NoSuchJob)?;
        if !matches!(
            job.status,
            JobStatus::New | JobStatus::Suspended | JobStatus::Running
        ) {
            return Err(ProcessError::JobState);
        }
        if job.status == JobStatus::Running && !job.in_background {
            debug!("job is already in fg");
            return Err(ProcessError::AlreadyForeground);
        }

        let previous = job.status;
        job.status = JobStatus::Running;
        job.in_background = false;
        (
            job.pgid.ok_or(ProcessError::JobState)?,
            previous,
            job.saved_termios.clone(),
        )
    };

    tcsetpgrp(SHELL_TERMINAL, pgid).map_err(|errno| ProcessError::sys("tcsetpgrp", errno))?;

    if cont && previous != JobStatus::Running {
        // Put the job's terminal modes back the way it left them before
        // waking it.
        if let Some(termios) = &saved_termios {
            tcsetattr(SHELL_TERMINAL, SetArg::TCSADRAIN, termios)
                .map_err(|errno| ProcessError::sys("tcsetattr", errno))?;
        }
        killpg(pgid, Signal::SIGCONT).map_err(|errno| ProcessError::sys("killpg", errno))?;
    }

    wait_for_job(shell, id)?;
    reclaim_terminal(shell, id)?;

    let (status, exit_code) = {
        let job = shell.jobs.get(id).ok_or(ProcessError::NoSuchJob)?;
        (job.status, job.exit_code)
    };
    if status == JobStatus::Exited {
        shell.set_last_exit_code(exit_code);
    } else if status == JobStatus::Suspended {
        if let Some(job) = shell.jobs.get(id) {
            job.print();
        }
    }

    Ok(())
}

/// Mark the job running in the background, optionally waking it with
/// `SIGCONT`. Valid only for jobs that have not started or are suspended.
pub fn run_in_background(shell: &mut Shell, id: JobId, cont: bool) -> Result<(), ProcessError> {
    debug!(%id, cont, "run_in_background");

    let job = shell.jobs.get_mut(id).ok_or(ProcessError::NoSuchJob)?;
    if !matches!(job.status, JobStatus::New | JobStatus::Suspended) {
        return Err(ProcessError::JobState);
    }

    job.status = JobStatus::Running;
    job.in_background = true;

    if cont {
        let pgid = job.pgid.ok_or(ProcessError::JobState)?;
        killpg(pgid, Signal::SIGCONT).map_err(|errno| ProcessError::sys("killpg", errno))?;
    }

    Ok(())
}

/// Block until the job's group leader changes state (exit, signal, or
/// stop) and fold that into the job. Pipeline members other than the
/// leader are reaped by the main loop as they finish.
pub fn wait_for_job(shell: &mut Shell, id: JobId) -> Result<(), ProcessError> {
    let pgid = shell
        .jobs
        .get(id)
        .and_then(|job| job.pgid)
        .ok_or(ProcessError::JobState)?;
    let with_rusage = shell.rusage;
    let debug_enabled = shell.debug > 0;

    loop {
        match wait_for(pgid, WaitPidFlag::WUNTRACED, with_rusage) {
            Err(Errno::EINTR) => continue,
            Err(errno) => {
                debug!("waitpid() failed: {}", errno);
                return Ok(());
            }
            Ok((status, usage)) => {
                debug!(pid = pgid.as_raw(), ?status, "reaped foreground job");
                if let Some(job) = shell.jobs.get_mut(id) {
                    job.update_status(status, debug_enabled);
                    if with_rusage && job.status.is_terminal() {
                        report_times(job, usage);
                    }
                }
                return Ok(());
            }
        }
    }
}

/// Take the terminal back from a job: remember the modes it leaves
/// behind, put the shell's group in the foreground again, and reinstate
/// the shell's own modes.
fn reclaim_terminal(shell: &mut Shell, id: JobId) -> Result<(), ProcessError> {
    tcsetpgrp(SHELL_TERMINAL, shell.shell_pgid)
        .map_err(|errno| ProcessError::sys("tcsetpgrp", errno))?;

    let job_termios =
        tcgetattr(SHELL_TERMINAL).map_err(|errno| ProcessError::sys("tcgetattr", errno))?;
    if let Some(job) = shell.jobs.get_mut(id) {
        job.saved_termios = Some(job_termios);
    }

    if let Some(termios) = &shell.shell_termios {
        tcsetattr(SHELL_TERMINAL, SetArg::TCSADRAIN, termios)
            .map_err(|errno| ProcessError::sys("tcsetattr", errno))?;
    }

    Ok(())
}
