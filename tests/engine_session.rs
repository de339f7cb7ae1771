//! A scripted engine talks to the real transport and controller over
//! loopback TCP, configured from a config file.

use std::time::Duration;

use dbgp_config::load_file;
use dbgp_controller::{Controller, ControllerOptions, DebuggerEvent, UserCommand};
use dbgp_proto::{frame_packet, Breakpoint, BreakpointStore, PropertyValue};
use dbgp_server::{channel, Transport, TransportConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const NS: &str = r#"xmlns="urn:debugger_protocol_v1" xmlns:xdebug="https://xdebug.org/dbgp/xdebug""#;

struct Daemon {
    events: mpsc::Receiver<DebuggerEvent>,
    commands: mpsc::Sender<UserCommand>,
}

impl Daemon {
    fn start(toml: &str) -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dbgpd.toml");
        std::fs::write(&path, toml).unwrap();
        let mut config = load_file(&path).unwrap();
        // Ephemeral port; a valid config cannot name port 0.
        config.server.port = 0;

        let (controller_side, transport_side) = channel(config.bridge.capacity);
        Transport::spawn(
            TransportConfig {
                bind_address: config.server.bind_address.clone(),
                max_sessions: config.server.max_sessions,
                max_packet_len: config.server.max_packet_bytes,
            },
            transport_side,
        );

        let breakpoints: BreakpointStore = config
            .breakpoints
            .iter()
            .map(|bp| Breakpoint::new(bp.file.clone(), bp.line - 1))
            .collect();
        let options = ControllerOptions {
            port: config.server.port,
            idekey: config.session.idekey.clone(),
            language: config.session.language.clone(),
            max_pending_transactions: config.session.max_pending_transactions,
            file_uris: config.session.file_uris,
            debug: config.debug,
        };
        let (events_tx, events) = mpsc::channel(64);
        let (commands, commands_rx) = mpsc::channel(16);
        tokio::spawn(
            Controller::new(options, controller_side, events_tx, breakpoints).run(commands_rx),
        );
        Self { events, commands }
    }

    async fn event(&mut self) -> DebuggerEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("controller stopped")
    }

    async fn listen(&mut self) -> String {
        self.commands.send(UserCommand::Start).await.unwrap();
        match self.event().await {
            DebuggerEvent::ServerStarted { address } => address,
            other => panic!("expected server start, got {other:?}"),
        }
    }
}

struct Engine {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Engine {
    async fn connect(address: &str) -> Self {
        let stream = TcpStream::connect(address).await.unwrap();
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    async fn send(&mut self, xml: &str) {
        self.writer.write_all(&frame_packet(xml)).await.unwrap();
    }

    /// Next NUL-terminated command, or `None` once the daemon hung up.
    async fn command(&mut self) -> Option<String> {
        let mut buf = Vec::new();
        let n = timeout(WAIT, self.reader.read_until(0, &mut buf))
            .await
            .expect("timed out waiting for a command")
            .unwrap();
        if n == 0 {
            return None;
        }
        assert_eq!(buf.pop(), Some(0));
        Some(String::from_utf8(buf).unwrap())
    }
}

fn init() -> String {
    format!(
        r#"<?xml version="1.0" encoding="iso-8859-1"?>
<init {NS} fileuri="file:///srv/app/index.php" language="PHP" protocol_version="1.0" appid="7" idekey="xdebug"><engine version="3.3.0"><![CDATA[Xdebug]]></engine></init>"#
    )
}

fn response(command: &str, transaction: &str, attrs: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="iso-8859-1"?>
<response {NS} command="{command}" transaction_id="{transaction}" {attrs}>{body}</response>"#
    )
}

#[tokio::test]
async fn engine_runs_to_breakpoint_and_stops() {
    let mut daemon = Daemon::start(
        r#"
[server]
bind_address = "127.0.0.1"

[[breakpoint]]
file = "/srv/app/index.php"
line = 5
"#,
    );
    let address = daemon.listen().await;
    let mut engine = Engine::connect(&address).await;
    assert!(matches!(daemon.event().await, DebuggerEvent::Connected { .. }));

    engine.send(&init()).await;
    assert_eq!(
        engine.command().await.as_deref(),
        Some("breakpoint_set -t line -f /srv/app/index.php -n 5 -i t-0")
    );
    engine
        .send(&response("breakpoint_set", "t-0", r#"state="enabled" id="180001""#, ""))
        .await;
    assert_eq!(engine.command().await.as_deref(), Some("run -i t-1"));

    engine
        .send(&response(
            "run",
            "t-1",
            r#"status="break" reason="ok""#,
            r#"<xdebug:message filename="file:///srv/app/index.php" lineno="5"></xdebug:message>"#,
        ))
        .await;
    assert_eq!(engine.command().await.as_deref(), Some("stack_get -i t-2"));
    engine
        .send(&response(
            "stack_get",
            "t-2",
            "",
            r#"<stack where="{main}" level="0" type="file" filename="file:///srv/app/index.php" lineno="5"></stack>"#,
        ))
        .await;

    assert!(matches!(daemon.event().await, DebuggerEvent::StackUpdated { .. }));
    assert_eq!(
        daemon.event().await,
        DebuggerEvent::Paused {
            file: "/srv/app/index.php".into(),
            line: 4
        }
    );

    assert_eq!(engine.command().await.as_deref(), Some("context_get -i t-3"));
    assert_eq!(
        engine.command().await.as_deref(),
        Some("context_names -d 0 -i t-4")
    );
    engine
        .send(&response(
            "context_get",
            "t-3",
            r#"context="0""#,
            r#"<property name="$name" fullname="$name" type="string" size="3" encoding="base64"><![CDATA[Ym9i]]></property>"#,
        ))
        .await;
    let DebuggerEvent::LocalsUpdated { context, .. } = daemon.event().await else {
        panic!("expected locals");
    };
    assert_eq!(
        context.properties[0].value,
        PropertyValue::String("bob".into())
    );

    daemon.commands.send(UserCommand::Run).await.unwrap();
    assert_eq!(engine.command().await.as_deref(), Some("run -i t-5"));
    engine
        .send(&response("run", "t-5", r#"status="stopping" reason="ok""#, ""))
        .await;

    assert_eq!(engine.command().await, None);
    assert!(matches!(
        daemon.event().await,
        DebuggerEvent::Disconnected { .. }
    ));
}

#[tokio::test]
async fn engine_with_foreign_idekey_is_dropped() {
    let mut daemon = Daemon::start(
        r#"
[session]
idekey = "PHPSTORM"

[[breakpoint]]
file = "/srv/app/index.php"
line = 1
"#,
    );
    let address = daemon.listen().await;
    let mut engine = Engine::connect(&address).await;
    assert!(matches!(daemon.event().await, DebuggerEvent::Connected { .. }));

    engine.send(&init()).await;
    assert!(matches!(daemon.event().await, DebuggerEvent::Error { .. }));
    assert_eq!(engine.command().await, None);
    assert!(matches!(
        daemon.event().await,
        DebuggerEvent::Disconnected { .. }
    ));
}

#[tokio::test]
async fn handshake_with_many_breakpoints_on_a_narrow_bridge() {
    const BREAKPOINTS: u32 = 300;
    let mut toml = String::from("[bridge]\ncapacity = 2\n");
    for line in 1..=BREAKPOINTS {
        toml.push_str(&format!(
            "\n[[breakpoint]]\nfile = \"/srv/app/index.php\"\nline = {line}\n"
        ));
    }
    let mut daemon = Daemon::start(&toml);
    let address = daemon.listen().await;
    let mut engine = Engine::connect(&address).await;
    assert!(matches!(daemon.event().await, DebuggerEvent::Connected { .. }));

    engine.send(&init()).await;
    for n in 0..BREAKPOINTS {
        let command = engine.command().await.expect("daemon hung up");
        let (head, transaction) = command.rsplit_once(" -i ").unwrap();
        assert_eq!(
            head,
            format!("breakpoint_set -t line -f /srv/app/index.php -n {}", n + 1)
        );
        assert_eq!(transaction, format!("t-{n}"));
        let id = format!(r#"state="enabled" id="{}""#, 1000 + n);
        engine
            .send(&response("breakpoint_set", transaction, &id, ""))
            .await;
    }
    assert_eq!(
        engine.command().await.as_deref(),
        Some(format!("run -i t-{BREAKPOINTS}").as_str())
    );
}
