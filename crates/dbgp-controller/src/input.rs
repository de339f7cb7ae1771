//! Commands the collaborator sends to the controller.

use std::str::FromStr;

use dbgp_proto::{Breakpoint, SessionId};

use crate::error::ParseError;

/// An operator request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Start listening for engines.
    Start,
    /// Stop listening; sessions stay open.
    StopServer,
    /// Close everything and end the controller.
    Shutdown,
    /// Continue execution.
    Run,
    /// Step into the next call.
    StepInto,
    /// Step over the next statement.
    StepOver,
    /// Run until the current function returns.
    StepOut,
    /// Drop the debugging session.
    Stop,
    /// Evaluate an expression in the paused script.
    Eval(String),
    /// Fetch locals of a stack depth.
    Context {
        /// Stack depth, 0 for the innermost frame.
        depth: u32,
    },
    /// Fetch the children of a property.
    Expand {
        /// Full property name.
        name: String,
        /// Stack depth the property lives in.
        depth: u32,
    },
    /// Add a line breakpoint.
    AddBreakpoint(Breakpoint),
    /// Remove a line breakpoint.
    RemoveBreakpoint {
        /// Editor path.
        path: String,
        /// Zero-based line.
        line: u32,
    },
    /// List breakpoints.
    ListBreakpoints,
    /// List the active and ignored sessions.
    Sessions,
    /// Close one session.
    CloseSession(SessionId),
}

impl FromStr for UserCommand {
    type Err = ParseError;

    /// Parse a console line. Anything that is not a known command is
    /// evaluated as an expression.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let cmd = match word.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "stop_server" => Self::StopServer,
            "shutdown" | "quit" | "exit" => Self::Shutdown,
            "run" => Self::Run,
            "step_into" => Self::StepInto,
            "step_over" => Self::StepOver,
            "step_out" => Self::StepOut,
            "stop" => Self::Stop,
            "eval" => {
                if rest.is_empty() {
                    return Err(ParseError::MissingArgument {
                        command: "eval",
                        argument: "an expression",
                    });
                }
                Self::Eval(rest.to_string())
            }
            "context" => Self::Context {
                depth: parse_depth("context", rest)?,
            },
            "expand" => parse_expand(rest)?,
            "break" => {
                let (path, line) = parse_location("break", rest)?;
                Self::AddBreakpoint(Breakpoint::new(path, line))
            }
            "clear" => {
                let (path, line) = parse_location("clear", rest)?;
                Self::RemoveBreakpoint { path, line }
            }
            "breakpoints" => Self::ListBreakpoints,
            "sessions" => Self::Sessions,
            "close" => {
                let session = rest.parse().map_err(|_| ParseError::InvalidArgument {
                    command: "close",
                    value: rest.to_string(),
                })?;
                Self::CloseSession(session)
            }
            _ => Self::Eval(line.to_string()),
        };
        Ok(cmd)
    }
}

fn parse_depth(command: &'static str, text: &str) -> Result<u32, ParseError> {
    if text.is_empty() {
        return Ok(0);
    }
    text.parse().map_err(|_| ParseError::InvalidArgument {
        command,
        value: text.to_string(),
    })
}

/// `expand <full name> [depth]`; names may contain spaces.
fn parse_expand(rest: &str) -> Result<UserCommand, ParseError> {
    if rest.is_empty() {
        return Err(ParseError::MissingArgument {
            command: "expand",
            argument: "a property name",
        });
    }
    let (name, depth) = match rest.rsplit_once(char::is_whitespace) {
        Some((name, depth)) => match depth.parse() {
            Ok(depth) => (name.trim(), depth),
            Err(_) => (rest, 0),
        },
        None => (rest, 0),
    };
    Ok(UserCommand::Expand {
        name: name.to_string(),
        depth,
    })
}

/// `<file>:<line>` with a one-based line; returns a zero-based line.
fn parse_location(command: &'static str, text: &str) -> Result<(String, u32), ParseError> {
    let missing = ParseError::MissingArgument {
        command,
        argument: "<file>:<line>",
    };
    let (path, line) = text.rsplit_once(':').ok_or(missing.clone())?;
    if path.is_empty() {
        return Err(missing);
    }
    let line: u32 = line
        .trim()
        .parse()
        .ok()
        .filter(|&l| l >= 1)
        .ok_or_else(|| ParseError::InvalidArgument {
            command,
            value: line.to_string(),
        })?;
    Ok((path.to_string(), line - 1))
}
