//! Typed DBGP packets.
//!
//! Every framed document is decoded once into a [`Packet`]; the rest of
//! the controller only sees owned, typed data.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::ids::TransactionId;

// ---------------------------------------------------------------------------
// Status and shared children
// ---------------------------------------------------------------------------

/// Execution status reported by the engine in the `status` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    /// The engine has not run any code yet.
    Starting,
    /// The script is executing.
    Running,
    /// Execution is paused (breakpoint, step).
    Break,
    /// The script finished; the engine waits for a final command.
    Stopping,
    /// The engine is done and will close the connection.
    Stopped,
}

impl FromStr for EngineStatus {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "break" => Ok(Self::Break),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            other => Err(DecodeError::InvalidAttribute {
                attribute: "status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Break => "break",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Contents of an `<error>` child element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineError {
    /// DBGP error code, when present.
    pub code: Option<i64>,
    /// Text of the nested `<message>` element.
    pub message: String,
}

/// Contents of an `<xdebug:message>` child carrying the break location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakMessage {
    /// Engine file URI.
    pub filename: Option<String>,
    /// One-based line number.
    pub lineno: Option<u32>,
}

// ---------------------------------------------------------------------------
// Stack, contexts, properties
// ---------------------------------------------------------------------------

/// One `<stack>` entry of a `stack_get` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Function or `{main}`.
    #[serde(rename = "where")]
    pub where_: String,
    /// File of the frame, as reported by the engine (usually a file URI).
    pub filename: String,
    /// One-based line number.
    pub lineno: u32,
    /// Depth, 0 for the innermost frame.
    pub level: u32,
}

/// One `<context>` entry of a `context_names` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextName {
    /// Human readable name (`Locals`, `Superglobals`, ...).
    pub name: String,
    /// Engine id used with `context_get -c`.
    pub id: String,
}

/// Decoded value of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    /// Compound values (arrays, objects) carry children instead.
    None,
    /// The `null` type.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// String, base64-decoded when the engine encoded it.
    String(String),
    /// Any other scalar, kept as text.
    Raw(String),
}

/// A `<property>` element and its nested children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Short name (`$a`, `key`).
    pub name: Option<String>,
    /// Fully qualified name usable with `property_get -n`.
    pub full_name: Option<String>,
    /// Engine type name.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Class of an object value.
    pub class_name: Option<String>,
    /// Whether the engine reports children (possibly not yet fetched).
    pub has_children: bool,
    /// Number of children reported by the engine.
    pub num_children: Option<u32>,
    /// Whether the value refers back to an ancestor.
    pub recursive: bool,
    /// Scalar value.
    pub value: PropertyValue,
    /// Children included in this response.
    pub children: Vec<Property>,
}

/// A variable scope as displayed to the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Context id the properties were fetched for.
    pub id: Option<String>,
    /// Top-level variables.
    pub properties: Vec<Property>,
}

// ---------------------------------------------------------------------------
// Packets
// ---------------------------------------------------------------------------

/// The `init` packet sent once by the engine after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitPacket {
    /// Scripting language of the engine.
    pub language: String,
    /// Comma separated list of IDE keys the engine accepts.
    pub idekey: String,
    /// Entry script.
    pub fileuri: Option<String>,
    /// Engine-side application id.
    pub appid: Option<String>,
    /// DBGP protocol version.
    pub protocol_version: Option<String>,
    /// Engine name from the `<engine>` child.
    pub engine_name: Option<String>,
    /// Engine version from the `<engine version>` attribute.
    pub engine_version: Option<String>,
}

impl InitPacket {
    /// Iterate the IDE keys the engine advertises.
    pub fn idekeys(&self) -> impl Iterator<Item = &str> {
        self.idekey.split(',').map(str::trim).filter(|k| !k.is_empty())
    }

    /// Whether `key` is one of the advertised IDE keys.
    pub fn accepts_idekey(&self, key: &str) -> bool {
        self.idekeys().any(|k| k == key)
    }
}

/// A `response` packet answering one command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponsePacket {
    /// Command this response answers.
    pub command: Option<String>,
    /// Echoed `-i` argument.
    pub transaction_id: Option<TransactionId>,
    /// Engine status after the command.
    pub status: Option<EngineStatus>,
    /// Reason attribute (`ok`, `error`, `exception`, ...).
    pub reason: Option<String>,
    /// `id` attribute, e.g. the breakpoint id of `breakpoint_set`.
    pub id: Option<String>,
    /// `success` attribute of `feature_set` and friends.
    pub success: Option<bool>,
    /// `context` attribute of `context_get`.
    pub context: Option<String>,
    /// Nested `<error>`.
    pub error: Option<EngineError>,
    /// Nested `<xdebug:message>`.
    pub message: Option<BreakMessage>,
    /// `<stack>` children.
    pub stack: Vec<StackFrame>,
    /// `<context>` children.
    pub contexts: Vec<ContextName>,
    /// `<property>` children.
    pub properties: Vec<Property>,
}

impl ResponsePacket {
    /// Turn a `context_get` response into the context it describes.
    pub fn into_context(self) -> Context {
        Context {
            id: self.context,
            properties: self.properties,
        }
    }
}

/// Any other top-level element (`stream`, `notify`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPacket {
    /// Local name of the top-level element.
    pub element: String,
    /// Engine status, when present.
    pub status: Option<EngineStatus>,
    /// Nested `<error>`.
    pub error: Option<EngineError>,
    /// Nested `<xdebug:message>`.
    pub message: Option<BreakMessage>,
}

/// A decoded inbound packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Connection handshake.
    Init(InitPacket),
    /// Answer to a command.
    Response(ResponsePacket),
    /// Anything else.
    Status(StatusPacket),
}

impl Packet {
    /// Decode the XML text of one framed packet.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let doc = Document::parse(text).map_err(|e| DecodeError::Xml(e.to_string()))?;
        let root = doc.root_element();

        let packet = match root.tag_name().name() {
            "init" => Packet::Init(decode_init(root)?),
            "response" => Packet::Response(decode_response(root)?),
            other => Packet::Status(StatusPacket {
                element: other.to_string(),
                status: status_attr(root)?,
                error: error_child(root),
                message: message_child(root),
            }),
        };
        Ok(packet)
    }

    /// Engine status carried by the packet, if any.
    pub fn status(&self) -> Option<EngineStatus> {
        match self {
            Packet::Init(_) => None,
            Packet::Response(r) => r.status,
            Packet::Status(s) => s.status,
        }
    }

    /// Engine-reported error carried by the packet, if any.
    pub fn error(&self) -> Option<&EngineError> {
        match self {
            Packet::Init(_) => None,
            Packet::Response(r) => r.error.as_ref(),
            Packet::Status(s) => s.error.as_ref(),
        }
    }

    /// Break location carried by the packet, if any.
    pub fn message(&self) -> Option<&BreakMessage> {
        match self {
            Packet::Init(_) => None,
            Packet::Response(r) => r.message.as_ref(),
            Packet::Status(s) => s.message.as_ref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Decoding helpers
// ---------------------------------------------------------------------------

fn decode_init(node: Node<'_, '_>) -> Result<InitPacket, DecodeError> {
    let engine = child_elements(node, "engine").next();
    Ok(InitPacket {
        language: required_attr(node, "language")?,
        idekey: node.attribute("idekey").unwrap_or_default().to_string(),
        fileuri: attr(node, "fileuri"),
        appid: attr(node, "appid"),
        protocol_version: attr(node, "protocol_version"),
        engine_name: engine.map(text_of).filter(|s| !s.is_empty()),
        engine_version: engine.and_then(|e| attr(e, "version")),
    })
}

fn decode_response(node: Node<'_, '_>) -> Result<ResponsePacket, DecodeError> {
    let stack = child_elements(node, "stack")
        .map(decode_stack_frame)
        .collect::<Result<Vec<_>, _>>()?;

    let contexts = child_elements(node, "context")
        .map(|c| {
            Ok(ContextName {
                name: required_attr(c, "name")?,
                id: required_attr(c, "id")?,
            })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;

    Ok(ResponsePacket {
        command: attr(node, "command"),
        transaction_id: node.attribute("transaction_id").map(TransactionId::from),
        status: status_attr(node)?,
        reason: attr(node, "reason"),
        id: attr(node, "id"),
        success: node.attribute("success").map(|v| v == "1"),
        context: attr(node, "context"),
        error: error_child(node),
        message: message_child(node),
        stack,
        contexts,
        properties: child_elements(node, "property").map(decode_property).collect(),
    })
}

fn decode_stack_frame(node: Node<'_, '_>) -> Result<StackFrame, DecodeError> {
    Ok(StackFrame {
        where_: attr(node, "where").unwrap_or_default(),
        filename: required_attr(node, "filename")?,
        lineno: numeric_attr(node, "lineno")?.unwrap_or(0),
        level: numeric_attr(node, "level")?.unwrap_or(0),
    })
}

fn decode_property(node: Node<'_, '_>) -> Property {
    let kind = attr(node, "type");
    let children: Vec<Property> = child_elements(node, "property").map(decode_property).collect();

    Property {
        name: attr(node, "name"),
        full_name: attr(node, "fullname"),
        class_name: attr(node, "classname"),
        has_children: node.attribute("children") == Some("1") || !children.is_empty(),
        num_children: node.attribute("numchildren").and_then(|n| n.parse().ok()),
        recursive: node.attribute("recursive") == Some("1"),
        value: decode_value(node, kind.as_deref()),
        kind,
        children,
    }
}

fn decode_value(node: Node<'_, '_>, kind: Option<&str>) -> PropertyValue {
    let raw = text_of(node);
    let text = if node.attribute("encoding") == Some("base64") {
        match STANDARD.decode(raw.trim()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!("undecodable base64 property value: {}", e);
                raw
            }
        }
    } else {
        raw
    };

    match kind {
        Some("null") => PropertyValue::Null,
        Some("bool") => PropertyValue::Bool(text.trim() == "1"),
        Some("int") => text
            .trim()
            .parse()
            .map(PropertyValue::Int)
            .unwrap_or(PropertyValue::Raw(text)),
        Some("float") => text
            .trim()
            .parse()
            .map(PropertyValue::Float)
            .unwrap_or(PropertyValue::Raw(text)),
        Some("string") => PropertyValue::String(text),
        Some("array") | Some("object") | Some("hash") => PropertyValue::None,
        _ if text.is_empty() => PropertyValue::None,
        _ => PropertyValue::Raw(text),
    }
}

fn error_child(node: Node<'_, '_>) -> Option<EngineError> {
    child_elements(node, "error").next().map(|e| EngineError {
        code: e.attribute("code").and_then(|c| c.parse().ok()),
        message: child_elements(e, "message")
            .next()
            .map(text_of)
            .unwrap_or_default(),
    })
}

fn message_child(node: Node<'_, '_>) -> Option<BreakMessage> {
    child_elements(node, "message").next().map(|m| BreakMessage {
        filename: attr(m, "filename"),
        lineno: m.attribute("lineno").and_then(|l| l.parse().ok()),
    })
}

fn status_attr(node: Node<'_, '_>) -> Result<Option<EngineStatus>, DecodeError> {
    node.attribute("status").map(str::parse).transpose()
}

fn child_elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

/// Concatenated text and CDATA content of an element.
fn text_of(node: Node<'_, '_>) -> String {
    node.children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect()
}

fn attr(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.attribute(name).map(str::to_string)
}

fn required_attr(node: Node<'_, '_>, name: &'static str) -> Result<String, DecodeError> {
    attr(node, name).ok_or_else(|| DecodeError::MissingAttribute {
        element: node.tag_name().name().to_string(),
        attribute: name,
    })
}

fn numeric_attr(node: Node<'_, '_>, name: &'static str) -> Result<Option<u32>, DecodeError> {
    node.attribute(name)
        .map(|v| {
            v.trim().parse().map_err(|_| DecodeError::InvalidAttribute {
                attribute: name,
                value: v.to_string(),
            })
        })
        .transpose()
}
