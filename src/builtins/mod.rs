use crate::shell::Shell;

mod bg;
mod cd;
mod comment;
mod echo;
mod exit;
mod fg;
mod jobs;
mod kill;
mod pwd;

/// An in-process command. Handlers receive the full trimmed input line
/// (parsing is skipped for builtins) and the shell.
pub trait BuiltinCommand {
    fn run(&self, ctx: &mut BuiltinCommandContext) -> anyhow::Result<BuiltinEffect>;
}

pub struct BuiltinCommandContext<'a> {
    /// The whole trimmed line, including the builtin's own name.
    pub line: &'a str,
    pub shell: &'a mut Shell,
}

/// What the main loop should do after a builtin ran.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BuiltinEffect {
    Continue,
    /// Leave the main loop; shutdown runs when the shell is dropped.
    ExitShell,
}

/// Look up a builtin by the line's first token. Exact name match only.
pub fn builtin_command(name: &str) -> Option<Box<dyn BuiltinCommand>> {
    match name {
        "exit" => Some(Box::new(exit::Exit)),
        "cd" => Some(Box::new(cd::Cd)),
        "pwd" => Some(Box::new(pwd::Pwd)),
        "echo" => Some(Box::new(echo::Echo)),
        "jobs" => Some(Box::new(jobs::Jobs)),
        "fg" => Some(Box::new(fg::Fg)),
        "bg" => Some(Box::new(bg::Bg)),
        "kill" => Some(Box::new(kill::Kill)),
        "#" => Some(Box::new(comment::Comment)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_resolve() {
        for name in ["exit", "cd", "pwd", "echo", "jobs", "fg", "bg", "kill", "#"] {
            assert!(builtin_command(name).is_some(), "{name} should be a builtin");
        }
    }

    #[test]
    fn lookup_is_exact() {
        assert!(builtin_command("echos").is_none());
        assert!(builtin_command("ech").is_none());
        assert!(builtin_command("EXIT").is_none());
        assert!(builtin_command("ls").is_none());
    }
}
