use pest::Parser;
use pest_derive::Parser;

use tracing::debug;

#[derive(Parser)]
#[grammar = "smash.pest"]
struct LineParser;

/// A single command within a pipeline: the program and its arguments plus
/// any file redirections. `$`-prefixed argv tokens stay literal here;
/// expansion happens at launch time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    pub argv: Vec<String>,
    pub redirect_in: Option<String>,
    pub redirect_out: Option<String>,
    pub redirect_err: Option<String>,
    pub append_out: bool,
}

/// A parsed input line: one or more commands connected by pipes, and
/// whether the whole thing should run in the background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    /// The input text as typed, kept for job listings.
    pub raw: String,
    pub background: bool,
    pub commands: Vec<Command>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing to execute (blank line, lone `&`, dangling redirection, ...).
    Empty,
    Fatal(String),
}

/// Parse one trimmed, comment-stripped input line into a [`Pipeline`].
///
/// The line is first split on `|` into commands and each command into
/// whitespace-delimited tokens; tokens are then classified:
///
/// * `&` anywhere (a lone token, a `&`-prefixed token, or a trailing `&` on
///   a token) marks the pipeline as background and is consumed,
/// * token-initial `>>`, `>`, `2>` and `<` introduce redirections, taking
///   the rest of the token as the path or, when the operator stands alone,
///   the following token,
/// * everything else is argv.
pub fn parse(line: &str) -> Result<Pipeline, ParseError> {
    let mut pairs =
        LineParser::parse(Rule::line, line).map_err(|err| ParseError::Fatal(err.to_string()))?;
    let parsed = pairs.next().ok_or(ParseError::Empty)?;

    let mut pipeline = Pipeline {
        raw: line.to_string(),
        background: false,
        commands: Vec::new(),
    };

    for pair in parsed.into_inner() {
        if pair.as_rule() != Rule::pipeline {
            continue;
        }

        for command in pair.into_inner() {
            let tokens: Vec<&str> = command.into_inner().map(|tok| tok.as_str()).collect();
            let command = classify_tokens(&tokens, &mut pipeline.background)?;
            pipeline.commands.push(command);
        }
    }

    if pipeline.commands.is_empty() {
        return Err(ParseError::Empty);
    }

    debug!(?pipeline, "parsed input");
    Ok(pipeline)
}

/// Turn one command's raw tokens into a [`Command`], recording a `&` seen
/// along the way in `background`.
fn classify_tokens(tokens: &[&str], background: &mut bool) -> Result<Command, ParseError> {
    let mut command = Command::default();
    let mut iter = tokens.iter().copied();

    while let Some(raw) = iter.next() {
        let mut token = raw;

        // A token beginning with `&` is consumed whole; a trailing `&` is
        // stripped and the remainder classified as usual.
        if token.starts_with('&') {
            *background = true;
            continue;
        }
        if let Some(stripped) = token.strip_suffix('&') {
            *background = true;
            if stripped.is_empty() {
                continue;
            }
            token = stripped;
        }

        if let Some(rest) = token.strip_prefix(">>") {
            command.redirect_out = Some(redirect_path(rest, &mut iter)?);
            command.append_out = true;
        } else if let Some(rest) = token.strip_prefix('>') {
            command.redirect_out = Some(redirect_path(rest, &mut iter)?);
        } else if let Some(rest) = token.strip_prefix("2>") {
            command.redirect_err = Some(redirect_path(rest, &mut iter)?);
        } else if let Some(rest) = token.strip_prefix('<') {
            command.redirect_in = Some(redirect_path(rest, &mut iter)?);
        } else {
            command.argv.push(token.to_string());
        }
    }

    if command.argv.is_empty() {
        return Err(ParseError::Empty);
    }

    Ok(command)
}

/// The path of a redirection: the rest of the operator token (`>file`), or
/// the next token when the operator stood alone (`> file`).
fn redirect_path<'a, I>(rest: &'a str, iter: &mut I) -> Result<String, ParseError>
where
    I: Iterator<Item = &'a str>,
{
    if !rest.is_empty() {
        return Ok(rest.to_string());
    }

    iter.next().map(str::to_string).ok_or(ParseError::Empty)
}
