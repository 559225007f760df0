use std::fs::File;
use std::io::{self, BufReader};

use crossterm::tty::IsTty;
use tracing_subscriber::{self, fmt, prelude::*, EnvFilter};

use event::SmashState;
use shell::Shell;

#[macro_use]
mod macros;

mod builtins;
mod eval;
mod event;
mod expand;
mod jobs;
mod parser;
mod process;
mod shell;

struct Config {
    debug: u32,
    rusage: bool,
    script: Option<String>,
}

/// `smash [-d] [-t] [file]`; `-d` may repeat. The first positional
/// argument names a script, extra positionals are ignored.
fn parse_args() -> Result<Config, ()> {
    let mut config = Config {
        debug: 0,
        rusage: false,
        script: None,
    };

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-d" => config.debug += 1,
            "-t" => config.rusage = true,
            flag if flag.starts_with('-') => return Err(()),
            path => {
                if config.script.is_none() {
                    config.script = Some(path.to_string());
                }
            }
        }
    }

    Ok(config)
}

fn usage() {
    println!("Usage: smash [-d] [-t] [file]");
}

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(()) => {
            usage();
            std::process::exit(1);
        }
    };

    let filter = if config.debug > 0 {
        EnvFilter::new("smash=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let mut shell = Shell::new(config.debug, config.rusage);

    let input: Box<dyn io::BufRead> = match &config.script {
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(err) => {
                smash_err!("open() failed to open file: {}", err);
                std::process::exit(1);
            }
        },
        None => {
            if io::stdin().is_tty() {
                if let Err(err) = shell.setup_interactive() {
                    smash_err!("{}", err);
                    std::process::exit(1);
                }
            }
            Box::new(BufReader::new(io::stdin()))
        }
    };

    let code = SmashState::new(shell, input).run();
    std::process::exit(code);
}
