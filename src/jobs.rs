use std::fmt;
use std::time::Instant;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::termios::Termios;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::debug;

use crate::parser::Pipeline;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct JobId(usize);

impl JobId {
    pub fn new(id: usize) -> JobId {
        JobId(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Lifecycle state of a job.
///
/// `Canceled` only exists transiently during shutdown, between the
/// `SIGTERM` sent by [`JobTable::cancel_all`] and the reap in
/// [`JobTable::wait_for_all`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JobStatus {
    New,
    Running,
    Suspended,
    Exited,
    Aborted,
    Canceled,
}

impl JobStatus {
    /// Terminal states carry an exit code and are garbage-collected by the
    /// next `jobs` listing.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Exited | JobStatus::Aborted)
    }

    pub fn is_live(self) -> bool {
        matches!(self, JobStatus::Running | JobStatus::Suspended)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            JobStatus::New => "new",
            JobStatus::Running => "running",
            JobStatus::Suspended => "suspended",
            JobStatus::Exited => "exited",
            JobStatus::Aborted => "aborted",
            JobStatus::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// One pipeline of child processes, tracked as a unit.
///
/// `pgid` is the process group shared by every pipeline member and equals
/// the pid of the leftmost one; it is `None` until the first fork.
/// `saved_termios` holds the terminal modes captured when the job last gave
/// the terminal back to the shell.
pub struct Job {
    pub id: JobId,
    pub pgid: Option<Pid>,
    pub status: JobStatus,
    pub exit_code: i32,
    pub in_background: bool,
    pub saved_termios: Option<Termios>,
    pub pipeline: Pipeline,
    pub started: Instant,
}

impl Job {
    /// A job fresh out of the parser: no id, no process group, `New`.
    pub fn new(pipeline: Pipeline) -> Job {
        Job {
            id: JobId(0),
            pgid: None,
            status: JobStatus::New,
            exit_code: 0,
            in_background: false,
            saved_termios: None,
            pipeline,
            started: Instant::now(),
        }
    }

    /// Apply a wait status reported by the kernel for this job's group
    /// leader. Terminal transitions record the exit code or the
    /// terminating signal number.
    pub fn update_status(&mut self, wait_status: WaitStatus, debug_enabled: bool) {
        match wait_status {
            WaitStatus::Stopped(..) => {
                self.status = JobStatus::Suspended;
            }
            WaitStatus::Continued(..) => {
                self.status = JobStatus::Running;
            }
            WaitStatus::Signaled(_, signal, _) => {
                self.status = JobStatus::Aborted;
                self.exit_code = signal as i32;
                if debug_enabled {
                    eprintln!(
                        "ABORTED: '{}' <signal={}>",
                        self.pipeline.raw, self.exit_code
                    );
                }
            }
            WaitStatus::Exited(_, code) => {
                self.status = JobStatus::Exited;
                self.exit_code = code;
                if debug_enabled {
                    eprintln!("ENDED: '{}' <ret={}>", self.pipeline.raw, self.exit_code);
                }
            }
            other => {
                debug!("unhandled wait status: {:?}", other);
            }
        }
    }

    /// The single-line `jobs` rendering: `[id] (status) cmd`, with the exit
    /// code appended to the status for finished jobs.
    pub fn render(&self) -> String {
        if self.status.is_terminal() {
            format!(
                "[{}] ({} <{}>) {}",
                self.id, self.status, self.exit_code, self.pipeline.raw
            )
        } else {
            format!("[{}] ({}) {}", self.id, self.status, self.pipeline.raw)
        }
    }

    pub fn print(&self) {
        println!("{}", self.render());
    }
}

/// All jobs created during this shell session, in insertion order.
#[derive(Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> JobTable {
        JobTable::default()
    }

    /// Append a job, assigning it the next id: one past the last entry's,
    /// or 1 for an empty table. Ids are monotonic within a session even as
    /// finished jobs are removed.
    pub fn insert(&mut self, mut job: Job) -> JobId {
        let id = JobId(self.jobs.last().map_or(0, |last| last.id.0) + 1);
        job.id = id;
        job.started = Instant::now();
        self.jobs.push(job);
        id
    }

    pub fn remove(&mut self, id: JobId) {
        self.jobs.retain(|job| job.id != id);
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| job.id == id)
    }

    /// The job whose group leader has the given pid, used to route reaped
    /// wait statuses back to their job.
    pub fn by_leader_mut(&mut self, pid: Pid) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| job.pgid == Some(pid))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Print every job, then drop the finished ones: an `exited`/`aborted`
    /// job is reported exactly once.
    pub fn list(&mut self) {
        let mut finished = Vec::new();
        for job in self.iter() {
            job.print();
            if job.status.is_terminal() {
                finished.push(job.id);
            }
        }
        for id in finished {
            self.remove(id);
        }
    }

    /// First step of shutdown: wake and terminate every live job's process
    /// group. `SIGCONT` first so suspended jobs can actually act on the
    /// `SIGTERM`.
    pub fn cancel_all(&mut self) {
        for job in &mut self.jobs {
            if !job.status.is_live() {
                continue;
            }

            if let Some(pgid) = job.pgid {
                if let Err(errno) = killpg(pgid, Signal::SIGCONT)
                    .and_then(|_| killpg(pgid, Signal::SIGTERM))
                {
                    smash_err!("killpg() failed: {}", errno.desc());
                }
            }
            job.status = JobStatus::Canceled;
        }
    }

    /// Second step of shutdown: blocking-reap every job that may still
    /// have children, so nothing is left for init to inherit. `EINTR` is
    /// retried; any other wait failure ends the process immediately, with
    /// no further cleanup.
    pub fn wait_for_all(&mut self) {
        for job in &mut self.jobs {
            if !matches!(
                job.status,
                JobStatus::Running | JobStatus::Suspended | JobStatus::Canceled
            ) {
                continue;
            }
            let Some(pgid) = job.pgid else {
                continue;
            };

            // Reap the whole process group; the leader's status becomes the
            // job's final state.
            loop {
                match waitpid(Pid::from_raw(-pgid.as_raw()), None) {
                    Ok(WaitStatus::Exited(pid, code)) => {
                        if pid == pgid {
                            job.status = JobStatus::Exited;
                            job.exit_code = code;
                        }
                    }
                    Ok(WaitStatus::Signaled(pid, signal, _)) => {
                        if pid == pgid {
                            job.status = JobStatus::Aborted;
                            job.exit_code = signal as i32;
                        }
                    }
                    Ok(_) => {}
                    Err(Errno::EINTR) => {}
                    Err(Errno::ECHILD) => break,
                    Err(_) => std::process::exit(1),
                }
            }
        }

        // Catch stragglers from pipelines whose job already finished.
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(_) => break,
                Ok(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn job(line: &str) -> Job {
        Job::new(parser::parse(line).expect("test line should parse"))
    }

    #[test]
    fn ids_are_monotonic() {
        let mut table = JobTable::new();
        let first = table.insert(job("sleep 1"));
        let second = table.insert(job("sleep 2"));
        assert_eq!(first, JobId::new(1));
        assert_eq!(second, JobId::new(2));

        // Removal does not reset the counter while later jobs remain.
        table.remove(first);
        let third = table.insert(job("sleep 3"));
        assert_eq!(third, JobId::new(3));
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut table = JobTable::new();
        for line in ["a", "b", "c"] {
            table.insert(job(line));
        }
        let raws: Vec<&str> = table.iter().map(|j| j.pipeline.raw.as_str()).collect();
        assert_eq!(raws, vec!["a", "b", "c"]);

        let mut prev = 0;
        for j in table.iter() {
            assert!(j.id.0 > prev);
            prev = j.id.0;
        }
    }

    #[test]
    fn render_running_and_finished() {
        let mut table = JobTable::new();
        let id = table.insert(job("sleep 60 &"));

        let entry = table.get_mut(id).unwrap();
        entry.status = JobStatus::Running;
        assert_eq!(entry.render(), "[1] (running) sleep 60 &");

        entry.status = JobStatus::Exited;
        entry.exit_code = 0;
        assert_eq!(entry.render(), "[1] (exited <0>) sleep 60 &");

        entry.status = JobStatus::Aborted;
        entry.exit_code = 15;
        assert_eq!(entry.render(), "[1] (aborted <15>) sleep 60 &");
    }

    #[test]
    fn listing_drops_finished_jobs_only() {
        let mut table = JobTable::new();
        let done = table.insert(job("true"));
        let live = table.insert(job("sleep 60 &"));

        table.get_mut(done).unwrap().status = JobStatus::Exited;
        table.get_mut(live).unwrap().status = JobStatus::Running;

        table.list();

        assert!(table.get(done).is_none());
        assert!(table.get(live).is_some());
        assert!(table.iter().all(|j| !j.status.is_terminal()));
    }

    #[test]
    fn update_status_sets_exit_code_once() {
        let mut j = job("false");
        j.update_status(
            WaitStatus::Exited(Pid::from_raw(100), 1),
            false,
        );
        assert_eq!(j.status, JobStatus::Exited);
        assert_eq!(j.exit_code, 1);
    }

    #[test]
    fn update_status_records_signal() {
        let mut j = job("sleep 60");
        j.update_status(
            WaitStatus::Signaled(Pid::from_raw(100), Signal::SIGTERM, false),
            false,
        );
        assert_eq!(j.status, JobStatus::Aborted);
        assert_eq!(j.exit_code, Signal::SIGTERM as i32);
    }

    #[test]
    fn update_status_stop_and_continue() {
        let mut j = job("sleep 60");
        j.update_status(
            WaitStatus::Stopped(Pid::from_raw(100), Signal::SIGTSTP),
            false,
        );
        assert_eq!(j.status, JobStatus::Suspended);

        j.update_status(WaitStatus::Continued(Pid::from_raw(100)), false);
        assert_eq!(j.status, JobStatus::Running);
    }

    #[test]
    fn cancel_all_marks_live_jobs_only() {
        let mut table = JobTable::new();
        let running = table.insert(job("sleep 60 &"));
        let done = table.insert(job("true"));
        let fresh = table.insert(job("sleep 1"));

        table.get_mut(running).unwrap().status = JobStatus::Running;
        table.get_mut(done).unwrap().status = JobStatus::Exited;
        // `fresh` stays New.

        table.cancel_all();

        assert_eq!(table.get(running).unwrap().status, JobStatus::Canceled);
        assert_eq!(table.get(done).unwrap().status, JobStatus::Exited);
        assert_eq!(table.get(fresh).unwrap().status, JobStatus::New);
    }

    #[test]
    fn remove_unlinks_job() {
        let mut table = JobTable::new();
        let first = table.insert(job("sleep 1"));
        let second = table.insert(job("sleep 2"));

        table.remove(first);

        assert!(table.get(first).is_none());
        assert!(table.get(second).is_some());
    }

    #[test]
    fn leader_lookup_matches_pgid() {
        let mut table = JobTable::new();
        let id = table.insert(job("sleep 60 &"));
        table.get_mut(id).unwrap().pgid = Some(Pid::from_raw(4242));

        assert!(table.by_leader_mut(Pid::from_raw(4242)).is_some());
        assert!(table.by_leader_mut(Pid::from_raw(4243)).is_none());
    }
}
