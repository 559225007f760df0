use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use tracing::debug;

use crate::jobs::JobId;

use super::{BuiltinCommand, BuiltinCommandContext, BuiltinEffect};

pub struct Kill;

impl BuiltinCommand for Kill {
    fn run(&self, ctx: &mut BuiltinCommandContext) -> anyhow::Result<BuiltinEffect> {
        // `kill -N jobid` with a numeric signal only.
        let Some(rest) = ctx.line.strip_prefix("kill ") else {
            return usage();
        };
        let Some(rest) = rest.trim_start().strip_prefix('-') else {
            return usage();
        };

        let mut parts = rest.split_whitespace();
        let Some(signum) = parts.next().and_then(|tok| tok.parse::<i32>().ok()) else {
            return usage();
        };
        let Some(id) = parts.next().and_then(|tok| tok.parse::<usize>().ok()) else {
            return usage();
        };
        let id = JobId::new(id);

        let Some(job) = ctx.shell.jobs.get(id) else {
            smash_err!("No such job.");
            return Ok(BuiltinEffect::Continue);
        };

        // Signals can only be delivered to jobs that are actually running
        // or suspended.
        if !job.status.is_live() {
            return usage();
        }
        let Some(pgid) = job.pgid else {
            return usage();
        };

        debug!(
            "sending signum {} to job {} (pgid {})",
            signum,
            id,
            pgid.as_raw()
        );

        let result = match Signal::try_from(signum) {
            Ok(signal) => killpg(pgid, signal),
            Err(_) => Err(Errno::EINVAL),
        };
        if let Err(errno) = result {
            smash_err!("Failed to send signal to job: {}", errno.desc());
        }

        Ok(BuiltinEffect::Continue)
    }
}

fn usage() -> anyhow::Result<BuiltinEffect> {
    eprintln!("Usage: kill -N jobid");
    Ok(BuiltinEffect::Continue)
}
