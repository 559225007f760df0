use std::env;

use crate::shell::Shell;

/// Expand a single token at launch time.
///
/// `$?` becomes the decimal last exit code, `$NAME` the environment value
/// (empty when unset, including the degenerate lone `$`), anything else is
/// returned literally.
pub fn expand_token(shell: &Shell, token: &str) -> String {
    match token.strip_prefix('$') {
        Some("?") => shell.last_exit_code().to_string(),
        Some(name) => env::var(name).unwrap_or_default(),
        None => token.to_string(),
    }
}

/// Expand every token of an argv, in order, as done in the child just
/// before exec.
pub fn expand_argv(shell: &Shell, argv: &[String]) -> Vec<String> {
    argv.iter().map(|token| expand_token(shell, token)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_tokens_pass_through() {
        let shell = Shell::new(0, false);
        assert_eq!(expand_token(&shell, "hello"), "hello");
        assert_eq!(expand_token(&shell, "-l"), "-l");
    }

    #[test]
    fn question_mark_is_last_exit_code() {
        let mut shell = Shell::new(0, false);
        shell.set_last_exit_code(42);
        assert_eq!(expand_token(&shell, "$?"), "42");
    }

    #[test]
    fn env_var_expands_or_empties() {
        let shell = Shell::new(0, false);
        env::set_var("SMASH_EXPAND_TEST", "value");
        assert_eq!(expand_token(&shell, "$SMASH_EXPAND_TEST"), "value");
        env::remove_var("SMASH_EXPAND_TEST");
        assert_eq!(expand_token(&shell, "$SMASH_EXPAND_TEST"), "");
    }

    #[test]
    fn bare_dollar_is_empty() {
        let shell = Shell::new(0, false);
        assert_eq!(expand_token(&shell, "$"), "");
    }

    #[test]
    fn argv_expansion_keeps_order() {
        let mut shell = Shell::new(0, false);
        shell.set_last_exit_code(1);
        let argv = vec!["echo".to_string(), "$?".to_string(), "x".to_string()];
        assert_eq!(expand_argv(&shell, &argv), vec!["echo", "1", "x"]);
    }
}
