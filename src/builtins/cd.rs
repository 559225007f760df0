use std::env;

use nix::unistd::chdir;
use tracing::debug;

use super::{BuiltinCommand, BuiltinCommandContext, BuiltinEffect};

pub struct Cd;

impl BuiltinCommand for Cd {
    fn run(&self, ctx: &mut BuiltinCommandContext) -> anyhow::Result<BuiltinEffect> {
        // Everything after `cd` is the path, leading whitespace skipped.
        let rest = ctx.line.strip_prefix("cd").unwrap_or("").trim_start();

        let path = if rest.is_empty() {
            match env::var("HOME") {
                Ok(home) => home,
                Err(_) => {
                    smash_err!("No set $HOME variable.");
                    return Ok(BuiltinEffect::Continue);
                }
            }
        } else if let Some(name) = rest.strip_prefix('$') {
            // Unset variables expand to an empty path; chdir then fails
            // with the OS error, which is reported below.
            env::var(name).unwrap_or_default()
        } else {
            rest.to_string()
        };

        let path = if path.starts_with('~') {
            match expand_tilde(&path) {
                Some(expanded) => expanded,
                None => {
                    smash_err!("failed to perform tilde expansion");
                    return Ok(BuiltinEffect::Continue);
                }
            }
        } else {
            path
        };

        match chdir(path.as_str()) {
            Ok(()) => debug!("changed to directory: {}", path),
            Err(errno) => smash_err!("{}", errno.desc()),
        }

        Ok(BuiltinEffect::Continue)
    }
}

/// `~` and `~/sub` resolve against our own home directory; other `~` forms
/// are not supported.
fn expand_tilde(path: &str) -> Option<String> {
    let home = dirs::home_dir()?;
    if path == "~" {
        return Some(home.to_string_lossy().into_owned());
    }
    let rest = path.strip_prefix("~/")?;
    Some(home.join(rest).to_string_lossy().into_owned())
}
