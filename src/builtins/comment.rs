use super::{BuiltinCommand, BuiltinCommandContext, BuiltinEffect};

pub struct Comment;

impl BuiltinCommand for Comment {
    fn run(&self, _: &mut BuiltinCommandContext) -> anyhow::Result<BuiltinEffect> {
        // Nothing to do for a comment.
        Ok(BuiltinEffect::Continue)
    }
}
