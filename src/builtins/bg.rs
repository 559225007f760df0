use tracing::debug;

use crate::jobs::JobId;
use crate::process;

use super::{BuiltinCommand, BuiltinCommandContext, BuiltinEffect};

pub struct Bg;

impl BuiltinCommand for Bg {
    fn run(&self, ctx: &mut BuiltinCommandContext) -> anyhow::Result<BuiltinEffect> {
        let Some(rest) = ctx.line.strip_prefix("bg ") else {
            return usage();
        };
        let Ok(id) = rest.trim().parse::<usize>() else {
            return usage();
        };
        let id = JobId::new(id);

        if ctx.shell.jobs.get(id).is_none() {
            smash_err!("Invalid job id.");
            return Ok(BuiltinEffect::Continue);
        }

        match process::run_in_background(ctx.shell, id, true) {
            Ok(()) => {}
            Err(err) if !err.is_fatal() => debug!("bg: {}", err),
            Err(err) => return Err(err.into()),
        }

        Ok(BuiltinEffect::Continue)
    }
}

fn usage() -> anyhow::Result<BuiltinEffect> {
    eprintln!("Usage: bg [jobid]");
    Ok(BuiltinEffect::Continue)
}
