/// Print an error message to stderr in the shell's reporting format.
///
/// Errors are never prefixed with the program name, only with `ERROR: `.
macro_rules! smash_err {
    ($fmt:expr) => {
        eprintln!(concat!("ERROR: ", $fmt))
    };
    ($fmt:expr, $($arg:tt)*) => {
        eprintln!(concat!("ERROR: ", $fmt), $($arg)*)
    };
}
