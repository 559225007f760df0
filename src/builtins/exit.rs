use tracing::debug;

use super::{BuiltinCommand, BuiltinCommandContext, BuiltinEffect};

pub struct Exit;

impl BuiltinCommand for Exit {
    fn run(&self, ctx: &mut BuiltinCommandContext) -> anyhow::Result<BuiltinEffect> {
        // Only the bare word exits; anything else on the line is rejected.
        if ctx.line != "exit" {
            debug!("command must be 'exit'");
            return Ok(BuiltinEffect::Continue);
        }

        Ok(BuiltinEffect::ExitShell)
    }
}
