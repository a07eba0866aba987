use log::trace;

use super::ast::{Command, Pipeline};
use super::lexer::{is_separator, Lexer, Token};

/// Parses one command line. Never fails: malformed input degrades into the
/// closest pipeline (for example an empty redirection target).
pub fn parse(line: &str) -> Pipeline {
    Pipeline::new(parse_command(line))
}

fn parse_command(line: &str) -> Command {
    let line = line.trim_matches(is_separator);
    let mut command = Command::default();

    let mut body = line;
    if let Some(rest) = body.strip_suffix('?') {
        command.autocomplete = true;
        body = rest;
    } else if let Some(rest) = body.strip_suffix('&') {
        command.background = true;
        body = rest;
    }
    // `cat ?`: the user is completing a new, still empty, argument.
    let trailing_gap = command.autocomplete && body.ends_with(is_separator);

    let mut tokens = Lexer::new(body);
    let Some(first) = tokens.next() else {
        return command;
    };
    command.name = first.text.to_string();

    let mut piped = false;
    while let Some(token) = tokens.next() {
        if token.is_operator("|") {
            // The next stage is parsed from the raw text, flag suffix included.
            command.next = Some(Box::new(parse_command(&line[token.end..])));
            piped = true;
            break;
        }
        if token.is_operator("&") {
            continue;
        }
        if !token.quoted && parse_redirect(&mut command, &token, &mut tokens) {
            continue;
        }
        command.args.push(token.text.to_string());
    }

    if trailing_gap && !piped && !command.has_redirect() {
        command.args.push(String::new());
    }
    trace!("parsed stage {:?}", command.name);
    command
}

/// Handles `<file`, `>file`, `>>file` and their detached forms `< file`.
/// Returns false when the token is not a redirection.
fn parse_redirect(command: &mut Command, token: &Token<'_>, tokens: &mut Lexer<'_>) -> bool {
    let (slot, target) = if let Some(target) = token.text.strip_prefix(">>") {
        (&mut command.redirect_append, target)
    } else if let Some(target) = token.text.strip_prefix('>') {
        (&mut command.redirect_out, target)
    } else if let Some(target) = token.text.strip_prefix('<') {
        (&mut command.redirect_in, target)
    } else {
        return false;
    };

    let target = if target.is_empty() {
        take_detached_target(tokens)
    } else {
        target.to_string()
    };
    *slot = Some(target);
    true
}

fn take_detached_target(tokens: &mut Lexer<'_>) -> String {
    let mut lookahead = tokens.clone();
    match lookahead.next() {
        Some(next) if !is_control(&next) => {
            *tokens = lookahead;
            next.text.to_string()
        }
        _ => String::new(),
    }
}

/// Pipes, `&` and other redirections never serve as a detached target.
fn is_control(token: &Token<'_>) -> bool {
    !token.quoted
        && (token.text == "|" || token.text == "&" || token.text.starts_with(['<', '>']))
}
