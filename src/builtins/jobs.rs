use super::{BuiltinCommand, BuiltinCommandContext, BuiltinEffect};

pub struct Jobs;

impl BuiltinCommand for Jobs {
    fn run(&self, ctx: &mut BuiltinCommandContext) -> anyhow::Result<BuiltinEffect> {
        // Listing also garbage-collects finished jobs.
        ctx.shell.jobs.list();
        Ok(BuiltinEffect::Continue)
    }
}
