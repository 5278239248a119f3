//! Interactive command loop: parses verbs, drives the session, prints
//! results and surfaces notifications as they arrive.

use std::io::Write as _;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use blueterm_core::{Notification, Session, SessionError, SessionState};

/// Static shell configuration, handed in by `main`.
pub struct ShellConfig {
    pub intro: String,
    pub prompt: String,
    /// Scan duration used when `scan` is given without an argument.
    pub scan_timeout: f64,
}

/// One turn of the command loop: a line of input or an unsolicited event.
enum Input {
    Line(Option<String>),
    Notify(Notification),
}

pub struct Shell {
    config: ShellConfig,
    session: Session,
    notifications: UnboundedReceiver<Notification>,
}

impl Shell {
    pub fn new(
        config: ShellConfig,
        session: Session,
        notifications: UnboundedReceiver<Notification>,
    ) -> Self {
        Self {
            config,
            session,
            notifications,
        }
    }

    /// Run until `quit` or end of input. Notifications may interleave with
    /// the prompt at any time; commands themselves run one at a time.
    pub async fn run(mut self) -> std::io::Result<()> {
        println!("{}", self.config.intro);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("{}", self.config.prompt);
            std::io::stdout().flush()?;
            let input = tokio::select! {
                line = lines.next_line() => Input::Line(line?),
                Some(event) = self.notifications.recv() => Input::Notify(event),
            };
            match input {
                Input::Line(None) => break,
                Input::Line(Some(line)) => {
                    if !self.dispatch(line.trim()).await {
                        break;
                    }
                }
                Input::Notify(event) => {
                    println!();
                    println!("{}", format_notification(&event));
                }
            }
        }
        Ok(())
    }

    /// Returns false when the shell should exit.
    async fn dispatch(&mut self, line: &str) -> bool {
        let (verb, args) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        match verb {
            "" => {}
            "scan" => self.cmd_scan(args).await,
            "list" => self.cmd_list(),
            "connect" => self.cmd_connect(args).await,
            "disconnect" => self.cmd_disconnect().await,
            "state" => self.cmd_state(),
            "read" => self.cmd_read(args).await,
            "write" => self.cmd_write(args).await,
            "help" | "?" => print_help(),
            "quit" | "exit" => return false,
            other => println!("error: unknown command '{other}' (try 'help')"),
        }
        true
    }

    async fn cmd_scan(&mut self, args: &str) {
        let timeout = if args.is_empty() {
            self.config.scan_timeout
        } else {
            match parse_timeout(args) {
                Some(timeout) => timeout,
                None => {
                    println!("error: unable to parse timeout (must be a positive number)");
                    return;
                }
            }
        };

        println!("Scanning now (blocking for {timeout} seconds)...");
        match self.session.scan(Duration::from_secs_f64(timeout)).await {
            Ok(_) => {
                println!("Scan complete:");
                self.cmd_list();
            }
            Err(err) => println!("error: {err}"),
        }
    }

    fn cmd_list(&self) {
        let devices = self.session.devices();
        if devices.is_empty() {
            println!("No BLE devices available");
            return;
        }
        for (i, dev) in devices.iter().enumerate() {
            let mut line = format!("[{i:2}] {} ({})", dev.address, dev.address_type);
            if let Some(rssi) = dev.rssi {
                line.push_str(&format!(" RSSI: {rssi} dBm"));
            }
            if let Some(name) = dev.name() {
                line.push_str(&format!(" (Name: '{name}')"));
            }
            println!("{line}");
        }
    }

    async fn cmd_connect(&mut self, args: &str) {
        let Some(index) = parse_index(args) else {
            println!("usage: connect <device index>");
            return;
        };
        match self.session.connect(index).await {
            Ok(services) => {
                for (si, service) in services.iter().enumerate() {
                    println!("Service {si:2} UUID: {}", service.uuid);
                    for (ci, ch) in service.characteristics.iter().enumerate() {
                        println!(
                            "{:5}   Char {ci:2} UUID: {} [{}]",
                            ch.handle, ch.uuid, ch.properties
                        );
                    }
                }
            }
            Err(err) => println!("error: {err}"),
        }
    }

    async fn cmd_disconnect(&mut self) {
        let address = self.session.disconnect().await;
        println!("disconnected: {address}");
    }

    fn cmd_state(&self) {
        match self.session.state() {
            SessionState::Idle => println!("idle"),
            SessionState::Connected { address } => println!("Connected to {address}"),
        }
    }

    async fn cmd_read(&mut self, args: &str) {
        let Some(handle) = parse_handle(args) else {
            println!("usage: read <handle>");
            return;
        };
        match self.session.read_text(handle).await {
            Ok(text) => println!("out: {text}"),
            Err(SessionError::Decode(err)) => {
                println!(
                    "error: value is not valid UTF-8, raw bytes: {}",
                    hex(err.as_bytes())
                );
            }
            Err(err) => println!("error: {err}"),
        }
    }

    async fn cmd_write(&mut self, args: &str) {
        let Some((handle, data)) = parse_write_args(args) else {
            println!("usage: write <handle> <data>");
            return;
        };
        if let Err(err) = self.session.write(handle, data.as_bytes()).await {
            println!("error: {err}");
        }
    }
}

fn print_help() {
    println!("commands:");
    println!("  scan [timeout]         scan for devices, replacing the cached list");
    println!("  list                   list the last scan's devices");
    println!("  connect <index>        connect to a device and discover its services");
    println!("  disconnect             close the connection");
    println!("  state                  show the connection state");
    println!("  read <handle>          read a characteristic and print it as text");
    println!("  write <handle> <data>  write text to a characteristic");
    println!("  quit                   leave the shell");
}

fn parse_timeout(arg: &str) -> Option<f64> {
    let timeout: f64 = arg.parse().ok()?;
    (timeout.is_finite() && timeout > 0.0).then_some(timeout)
}

fn parse_index(arg: &str) -> Option<usize> {
    arg.parse().ok()
}

fn parse_handle(arg: &str) -> Option<u16> {
    arg.parse().ok()
}

/// Splits `write` arguments into a handle and the rest of the line. The
/// payload may contain spaces and must be non-empty.
fn parse_write_args(args: &str) -> Option<(u16, &str)> {
    let (head, rest) = args.split_once(char::is_whitespace)?;
    let handle = head.parse().ok()?;
    let rest = rest.trim_start();
    (!rest.is_empty()).then_some((handle, rest))
}

/// Notifications print as raw `(handle, payload)` events, whether or not the
/// handle is known to the current registry.
fn format_notification(event: &Notification) -> String {
    match std::str::from_utf8(&event.value) {
        Ok(text) => format!(
            "notification: handle={} data='{}'",
            event.handle,
            text.trim_end()
        ),
        Err(_) => format!("notification: handle={} data={}", event.handle, hex(&event.value)),
    }
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_must_be_a_positive_number() {
        assert_eq!(parse_timeout("2.5"), Some(2.5));
        assert_eq!(parse_timeout("3"), Some(3.0));
        assert_eq!(parse_timeout("abc"), None);
        assert_eq!(parse_timeout("-1"), None);
        assert_eq!(parse_timeout("0"), None);
        assert_eq!(parse_timeout("inf"), None);
    }

    #[test]
    fn write_args_split_once_and_keep_spaces_in_the_payload() {
        assert_eq!(parse_write_args("12 hello world"), Some((12, "hello world")));
        assert_eq!(parse_write_args("12   padded"), Some((12, "padded")));
        assert_eq!(parse_write_args("12"), None);
        assert_eq!(parse_write_args("12 "), None);
        assert_eq!(parse_write_args("x hello"), None);
        assert_eq!(parse_write_args(""), None);
    }

    #[test]
    fn notifications_format_as_raw_events_even_for_unknown_handles() {
        let text = format_notification(&Notification {
            handle: 99,
            value: b"pong\n".to_vec(),
        });
        assert_eq!(text, "notification: handle=99 data='pong'");

        let binary = format_notification(&Notification {
            handle: 7,
            value: vec![0xde, 0xad],
        });
        assert_eq!(binary, "notification: handle=7 data=dead");
    }
}
