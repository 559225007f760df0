use crate::expand;

use super::{BuiltinCommand, BuiltinCommandContext, BuiltinEffect};

pub struct Echo;

impl BuiltinCommand for Echo {
    fn run(&self, ctx: &mut BuiltinCommandContext) -> anyhow::Result<BuiltinEffect> {
        // Each argument token is expanded and followed by a single space.
        let mut out = String::new();
        for token in ctx.line.split_whitespace().skip(1) {
            out.push_str(&expand::expand_token(ctx.shell, token));
            out.push(' ');
        }
        println!("{out}");

        Ok(BuiltinEffect::Continue)
    }
}
