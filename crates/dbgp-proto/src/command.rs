//! Outbound DBGP commands.
//!
//! A command is `name -x value ... -i <transaction> [-- <base64 data>]`.
//! The transaction argument is always added last by [`Command::serialize`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::ids::TransactionId;

/// A command waiting to be written to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<(char, String)>,
    data: Option<Vec<u8>>,
}

impl Command {
    /// Start a command with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            data: None,
        }
    }

    /// Add `-flag value`, replacing an earlier value for the same flag.
    pub fn arg(mut self, flag: char, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.args.iter_mut().find(|(f, _)| *f == flag) {
            Some(slot) => slot.1 = value,
            None => self.args.push((flag, value)),
        }
        self
    }

    /// Attach a data payload, sent base64-encoded after `--`.
    pub fn data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the command line, without the trailing NUL.
    ///
    /// A caller supplied `-i` is ignored; the registry's id always wins.
    pub fn serialize(&self, transaction: &TransactionId) -> String {
        let mut out = self.name.clone();
        for (flag, value) in self.args.iter().filter(|(f, _)| *f != 'i') {
            out.push_str(" -");
            out.push(*flag);
            out.push(' ');
            out.push_str(&quote(value));
        }
        out.push_str(" -i ");
        out.push_str(transaction.as_str());
        if let Some(data) = &self.data {
            out.push_str(" -- ");
            out.push_str(&STANDARD.encode(data));
        }
        out
    }

    // -- Constructors ------------------------------------------------------

    /// `run`
    pub fn run() -> Self {
        Self::new("run")
    }

    /// `step_into`
    pub fn step_into() -> Self {
        Self::new("step_into")
    }

    /// `step_over`
    pub fn step_over() -> Self {
        Self::new("step_over")
    }

    /// `step_out`
    pub fn step_out() -> Self {
        Self::new("step_out")
    }

    /// `stack_get`
    pub fn stack_get() -> Self {
        Self::new("stack_get")
    }

    /// `context_names -d <depth>`
    pub fn context_names(depth: u32) -> Self {
        Self::new("context_names").arg('d', depth.to_string())
    }

    /// `context_get`, the innermost frame's locals unless `-c`/`-d` are added.
    pub fn context_get() -> Self {
        Self::new("context_get")
    }

    /// `breakpoint_set -t line -f <file> -n <lineno>` with a one-based line.
    pub fn breakpoint_set_line(file_uri: &str, lineno: u32) -> Self {
        Self::new("breakpoint_set")
            .arg('t', "line")
            .arg('f', file_uri)
            .arg('n', lineno.to_string())
    }

    /// `breakpoint_remove -d <id>`
    pub fn breakpoint_remove(id: &str) -> Self {
        Self::new("breakpoint_remove").arg('d', id)
    }

    /// `feature_set -n <name> -v <value>`
    pub fn feature_set(name: &str, value: impl Into<String>) -> Self {
        Self::new("feature_set").arg('n', name).arg('v', value)
    }

    /// `eval -- <base64 expression>`
    pub fn eval(expression: &str) -> Self {
        Self::new("eval").data(expression.as_bytes())
    }

    /// `property_get -n <fullname> -d <depth>`
    pub fn property_get(full_name: &str, depth: u32) -> Self {
        Self::new("property_get")
            .arg('n', full_name)
            .arg('d', depth.to_string())
    }
}

/// Quote a value that would otherwise split the command line.
fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
