//! Line console: stdin commands in, rendered events out.

use std::fmt::Write as _;

use dbgp_controller::{DebuggerEvent, ParseError, UserCommand};
use dbgp_proto::path::shorten;
use dbgp_proto::{Breakpoint, Property, PropertyValue, StackFrame};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Longest string value shown before eliding the middle.
const MAX_VALUE_LEN: usize = 120;

/// How events are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    /// Human readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Read command lines until EOF, then ask the controller to shut down.
///
/// Lines that do not parse are reported through `feedback` so they show
/// up in the same output stream as controller events.
pub(crate) async fn input_loop<R>(
    reader: R,
    commands: mpsc::Sender<UserCommand>,
    feedback: mpsc::Sender<DebuggerEvent>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("failed to read command line: {}", e);
                break;
            }
        };
        let command = match line.parse::<UserCommand>() {
            Ok(command) => command,
            Err(ParseError::Empty) => continue,
            Err(e) => {
                let _ = feedback.send(DebuggerEvent::error(e.to_string())).await;
                continue;
            }
        };
        let done = command == UserCommand::Shutdown;
        if commands.send(command).await.is_err() || done {
            return;
        }
    }
    tracing::debug!("console input closed");
    let _ = commands.send(UserCommand::Shutdown).await;
}

/// Print events until every sender is gone.
pub(crate) async fn output_loop<W>(
    mut events: mpsc::Receiver<DebuggerEvent>,
    format: OutputFormat,
    mut out: W,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = events.recv().await {
        let text = match format {
            OutputFormat::Text => render(&event),
            OutputFormat::Json => match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("cannot encode event: {}", e);
                    continue;
                }
            },
        };
        out.write_all(text.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
    }
    Ok(())
}

/// Render an event as text, possibly spanning several lines.
pub(crate) fn render(event: &DebuggerEvent) -> String {
    match event {
        DebuggerEvent::ServerStarted { address } => format!("listening on {address}"),
        DebuggerEvent::ServerStopped => "server stopped".to_string(),
        DebuggerEvent::Connected { session } => format!("{session} connected"),
        DebuggerEvent::Disconnected { session } => format!("{session} disconnected"),
        DebuggerEvent::SessionIgnored { session } => {
            format!("{session} ignored, another session is active")
        }
        DebuggerEvent::Paused { file, line } => format!("paused at {}:{}", file, line + 1),
        DebuggerEvent::StackUpdated { frames } => render_stack(frames),
        DebuggerEvent::LocalsUpdated { depth, context } => {
            render_scope(&format!("locals (depth {depth})"), &context.properties)
        }
        DebuggerEvent::SuperglobalsUpdated { context } => {
            render_scope("superglobals", &context.properties)
        }
        DebuggerEvent::BreakpointAdded { breakpoint } => {
            format!("breakpoint added: {}", render_breakpoint(breakpoint))
        }
        DebuggerEvent::BreakpointRemoved { breakpoint } => {
            format!("breakpoint removed: {}", render_breakpoint(breakpoint))
        }
        DebuggerEvent::BreakpointsListed { breakpoints } if breakpoints.is_empty() => {
            "no breakpoints".to_string()
        }
        DebuggerEvent::BreakpointsListed { breakpoints } => breakpoints
            .iter()
            .map(render_breakpoint)
            .collect::<Vec<_>>()
            .join("\n"),
        DebuggerEvent::EvalResult { expression, value } => match value {
            Some(property) => {
                let mut out = format!("{expression} = {}", render_value(property));
                render_children(&mut out, &property.children, 1);
                out
            }
            None => format!("{expression}: no value"),
        },
        DebuggerEvent::PropertyExpanded { name, property } => match property {
            Some(property) => {
                let mut out = format!("{name} = {}", render_value(property));
                render_children(&mut out, &property.children, 1);
                out
            }
            None => format!("{name}: not found"),
        },
        DebuggerEvent::EngineError { code, message } => match code {
            Some(code) => format!("engine error {code}: {message}"),
            None => format!("engine error: {message}"),
        },
        DebuggerEvent::Error { message } => format!("error: {message}"),
        DebuggerEvent::Sessions {
            active,
            status,
            ignored,
        } => {
            let mut out = match (active, status) {
                (Some(id), Some(status)) => format!("active: {id} ({status:?})"),
                (Some(id), None) => format!("active: {id}"),
                _ => "active: none".to_string(),
            };
            if !ignored.is_empty() {
                let ids: Vec<String> = ignored.iter().map(ToString::to_string).collect();
                let _ = write!(out, "\nignored: {}", ids.join(", "));
            }
            out
        }
    }
}

fn render_stack(frames: &[StackFrame]) -> String {
    if frames.is_empty() {
        return "stack: empty".to_string();
    }
    frames
        .iter()
        .map(|f| format!("#{} {} at {}:{}", f.level, f.where_, f.filename, f.lineno))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_breakpoint(bp: &Breakpoint) -> String {
    match &bp.server_id {
        Some(id) => format!("{}:{} [{}]", bp.path, bp.line + 1, id),
        None => format!("{}:{}", bp.path, bp.line + 1),
    }
}

fn render_scope(title: &str, properties: &[Property]) -> String {
    let mut out = format!("{title}:");
    if properties.is_empty() {
        out.push_str(" none");
    }
    render_children(&mut out, properties, 1);
    out
}

fn render_children(out: &mut String, properties: &[Property], depth: usize) {
    for property in properties {
        let name = property.name.as_deref().unwrap_or("?");
        let _ = write!(
            out,
            "\n{:indent$}{} = {}",
            "",
            name,
            render_value(property),
            indent = depth * 2
        );
        render_children(out, &property.children, depth + 1);
    }
}

fn render_value(property: &Property) -> String {
    let scalar = match &property.value {
        PropertyValue::None => None,
        PropertyValue::Null => Some("null".to_string()),
        PropertyValue::Bool(b) => Some(b.to_string()),
        PropertyValue::Int(i) => Some(i.to_string()),
        PropertyValue::Float(f) => Some(f.to_string()),
        PropertyValue::String(s) => Some(format!("\"{}\"", shorten(s, MAX_VALUE_LEN))),
        PropertyValue::Raw(s) => Some(shorten(s, MAX_VALUE_LEN)),
    };
    if let Some(scalar) = scalar {
        return scalar;
    }

    let kind = property
        .class_name
        .as_deref()
        .or(property.kind.as_deref())
        .unwrap_or("value");
    let mut text = match property.num_children {
        Some(n) => format!("{kind}({n})"),
        None => kind.to_string(),
    };
    if property.recursive {
        text.push_str(" *recursion*");
    } else if property.has_children && property.children.is_empty() {
        text.push_str(" {...}");
    }
    text
}
