use nix::unistd::getcwd;

use super::{BuiltinCommand, BuiltinCommandContext, BuiltinEffect};

pub struct Pwd;

impl BuiltinCommand for Pwd {
    fn run(&self, _: &mut BuiltinCommandContext) -> anyhow::Result<BuiltinEffect> {
        // getcwd grows its buffer internally until the path fits.
        match getcwd() {
            Ok(path) => println!("{}", path.display()),
            Err(errno) => smash_err!("getcwd() failed: {}", errno.desc()),
        }

        Ok(BuiltinEffect::Continue)
    }
}
