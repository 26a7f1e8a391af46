//! Terminal client
//!
//! A line-oriented client for the router. It registers on connect, prints
//! whatever the router sends, refreshes the list of nearby users on a timer
//! and turns slash commands typed on stdin into protocol requests.

use std::fmt;
use std::time::Duration;

use nearchat_core::{
    decode_server_message, encode_record, ClientRequest, Coordinates, ServerMessage, VisibleUser,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// A command typed by the user
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Move { lat: f64, lon: f64 },
    Refresh,
    Msg { to: String, text: String },
    Who,
    Help,
    Quit,
}

/// Why a typed line is not a command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command: {0} (try /help)")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
}

impl ClientCommand {
    pub const HELP: &'static str = "\
Commands:
  /move <lat> <lon>    update your position
  /refresh             ask who is nearby
  /who                 show the last list of nearby users
  /msg <user> <text>   send a message
  /help                show this help
  /quit                leave";

    /// Parse one stdin line; blank lines yield `None`
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        let parsed = match command {
            "/move" => {
                let mut parts = rest.split_whitespace();
                let (Some(lat), Some(lon), None) = (parts.next(), parts.next(), parts.next()) else {
                    return Err(CommandError::Usage("/move <lat> <lon>"));
                };
                let coords = Coordinates::new(parse_coordinate(lat)?, parse_coordinate(lon)?)
                    .map_err(|_| CommandError::InvalidCoordinate(rest.to_string()))?;
                ClientCommand::Move {
                    lat: coords.lat,
                    lon: coords.lon,
                }
            }
            "/msg" => {
                let Some((to, text)) = rest.split_once(char::is_whitespace) else {
                    return Err(CommandError::Usage("/msg <user> <text>"));
                };
                let text = text.trim();
                if text.is_empty() {
                    return Err(CommandError::Usage("/msg <user> <text>"));
                }
                ClientCommand::Msg {
                    to: to.to_string(),
                    text: text.to_string(),
                }
            }
            "/refresh" => ClientCommand::Refresh,
            "/who" => ClientCommand::Who,
            "/help" => ClientCommand::Help,
            "/quit" | "/exit" => ClientCommand::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(parsed))
    }
}

fn parse_coordinate(text: &str) -> std::result::Result<f64, CommandError> {
    text.parse::<f64>()
        .map_err(|_| CommandError::InvalidCoordinate(text.to_string()))
}

/// Display form of one nearby user
pub struct NearbyUser<'a>(pub &'a VisibleUser);

impl fmt::Display for NearbyUser<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}m)", self.0.username, self.0.distance)
    }
}

// ----------------------------------------------------------------------------
// Chat Client
// ----------------------------------------------------------------------------

/// Client-side session state and the write half of the router connection
pub struct ChatClient<W> {
    username: String,
    location: Coordinates,
    nearby: Vec<VisibleUser>,
    writer: W,
}

impl<W> ChatClient<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(username: impl Into<String>, location: Coordinates, writer: W) -> Self {
        Self {
            username: username.into(),
            location,
            nearby: Vec::new(),
            writer,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn location(&self) -> Coordinates {
        self.location
    }

    /// The last visibility list received, without this client's own name
    pub fn nearby(&self) -> &[VisibleUser] {
        &self.nearby
    }

    async fn send(&mut self, request: &ClientRequest) -> Result<()> {
        let line = encode_record(request)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        debug!(action = request.action(), "Request sent");
        Ok(())
    }

    pub async fn register(&mut self) -> Result<()> {
        let request = ClientRequest::Register {
            username: self.username.clone(),
            lat: self.location.lat,
            lon: self.location.lon,
        };
        self.send(&request).await
    }

    pub async fn refresh(&mut self) -> Result<()> {
        let request = ClientRequest::Refresh {
            username: self.username.clone(),
        };
        self.send(&request).await
    }

    /// Execute a typed command; returns the lines to show and whether to keep running
    pub async fn execute(&mut self, command: ClientCommand) -> Result<(Vec<String>, bool)> {
        let output = match command {
            ClientCommand::Move { lat, lon } => {
                let location = Coordinates::new(lat, lon)?;
                self.send(&ClientRequest::UpdateLocation {
                    username: self.username.clone(),
                    lat,
                    lon,
                })
                .await?;
                self.location = location;
                vec![format!("Your position: {}", location)]
            }
            ClientCommand::Refresh => {
                self.refresh().await?;
                Vec::new()
            }
            ClientCommand::Msg { to, text } => {
                let line = format!("You -> {}: {}", to, text);
                self.send(&ClientRequest::Message {
                    sender: self.username.clone(),
                    receiver: to,
                    text,
                })
                .await?;
                vec![line]
            }
            ClientCommand::Who => self.render_nearby(),
            ClientCommand::Help => vec![ClientCommand::HELP.to_string()],
            ClientCommand::Quit => return Ok((Vec::new(), false)),
        };
        Ok((output, true))
    }

    /// Apply a router record and return the lines to show
    pub fn handle_server_message(&mut self, message: ServerMessage) -> Vec<String> {
        match message {
            ServerMessage::RegisterAck { message } => vec![message],
            ServerMessage::RefreshAck { visible_users } => {
                let username = self.username.clone();
                self.nearby = visible_users
                    .into_iter()
                    .filter(|user| user.username != username)
                    .collect();
                self.render_nearby()
            }
            ServerMessage::Message { sender, text } => vec![format!("{}: {}", sender, text)],
        }
    }

    fn render_nearby(&self) -> Vec<String> {
        if self.nearby.is_empty() {
            return vec!["Nobody nearby".to_string()];
        }
        let mut lines = vec!["Nearby:".to_string()];
        lines.extend(self.nearby.iter().map(|user| format!("  {}", NearbyUser(user))));
        lines
    }

    /// Drive the session until `/quit`, end of input, or the router hanging up
    pub async fn run<S, I>(
        &mut self,
        server: S,
        input: I,
        refresh_interval: Duration,
    ) -> Result<()>
    where
        S: AsyncBufRead + Unpin,
        I: AsyncBufRead + Unpin,
    {
        let mut server_lines = server.lines();
        let mut input_lines = input.lines();
        let mut input_open = true;

        let mut refresh = tokio::time::interval_at(
            tokio::time::Instant::now() + refresh_interval,
            refresh_interval,
        );
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        self.register().await?;

        loop {
            tokio::select! {
                line = server_lines.next_line() => match line? {
                    Some(line) => match decode_server_message(&line) {
                        Ok(Some(message)) => print_lines(self.handle_server_message(message)),
                        Ok(None) => debug!("Ignoring unknown record from router"),
                        Err(e) => warn!("Malformed record from router: {}", e),
                    },
                    None => return Err(CliError::Disconnected),
                },
                line = input_lines.next_line(), if input_open => match line? {
                    Some(line) => match ClientCommand::parse(&line) {
                        Ok(Some(command)) => {
                            let (output, keep_running) = self.execute(command).await?;
                            print_lines(output);
                            if !keep_running {
                                return Ok(());
                            }
                        }
                        Ok(None) => {}
                        Err(e) => println!("{}", e),
                    },
                    None => input_open = false,
                },
                _ = refresh.tick() => self.refresh().await?,
            }
        }
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn create_test_client() -> (ChatClient<tokio::io::DuplexStream>, tokio::io::DuplexStream) {
        let (client, router) = tokio::io::duplex(4096);
        let chat = ChatClient::new("alice", Coordinates::new(1.0, 2.0).unwrap(), client);
        (chat, router)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            ClientCommand::parse("/move 10 -20.5").unwrap(),
            Some(ClientCommand::Move { lat: 10.0, lon: -20.5 })
        );
        assert_eq!(
            ClientCommand::parse("/msg bob hello there  ").unwrap(),
            Some(ClientCommand::Msg {
                to: "bob".to_string(),
                text: "hello there".to_string()
            })
        );
        assert_eq!(ClientCommand::parse("/refresh").unwrap(), Some(ClientCommand::Refresh));
        assert_eq!(ClientCommand::parse(" /who ").unwrap(), Some(ClientCommand::Who));
        assert_eq!(ClientCommand::parse("/quit").unwrap(), Some(ClientCommand::Quit));
        assert_eq!(ClientCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            ClientCommand::parse("/move 1"),
            Err(CommandError::Usage("/move <lat> <lon>"))
        );
        assert_eq!(
            ClientCommand::parse("/move north 3"),
            Err(CommandError::InvalidCoordinate("north".to_string()))
        );
        assert_eq!(
            ClientCommand::parse("/msg bob"),
            Err(CommandError::Usage("/msg <user> <text>"))
        );
        assert_eq!(
            ClientCommand::parse("hello"),
            Err(CommandError::Unknown("hello".to_string()))
        );
        assert!(ClientCommand::parse("/move NaN 0").is_err());
    }

    #[test]
    fn test_refresh_ack_filters_own_name() {
        let (mut chat, _router) = create_test_client();
        let lines = chat.handle_server_message(ServerMessage::RefreshAck {
            visible_users: vec![VisibleUser::new("alice", 0.0), VisibleUser::new("bob", 42.9)],
        });

        assert_eq!(chat.nearby(), &[VisibleUser::new("bob", 42.0)]);
        assert_eq!(lines, vec!["Nearby:".to_string(), "  bob (42m)".to_string()]);
    }

    #[test]
    fn test_incoming_message_rendering() {
        let (mut chat, _router) = create_test_client();
        let lines = chat.handle_server_message(ServerMessage::Message {
            sender: "bob".to_string(),
            text: "hi".to_string(),
        });
        assert_eq!(lines, vec!["bob: hi".to_string()]);
    }

    #[tokio::test]
    async fn test_commands_write_protocol_records() {
        let (mut chat, router) = create_test_client();
        let mut router = BufReader::new(router).lines();

        chat.register().await.unwrap();
        let (_, running) = chat
            .execute(ClientCommand::Move { lat: 3.0, lon: 4.0 })
            .await
            .unwrap();
        assert!(running);
        chat.execute(ClientCommand::Msg {
            to: "bob".to_string(),
            text: "yo".to_string(),
        })
        .await
        .unwrap();
        let (_, running) = chat.execute(ClientCommand::Quit).await.unwrap();
        assert!(!running);

        let register: serde_json::Value =
            serde_json::from_str(&router.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(register["action"], "register");
        assert_eq!(register["username"], "alice");

        let update: serde_json::Value =
            serde_json::from_str(&router.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(update["action"], "update_location");
        assert_eq!(update["lat"], 3.0);
        assert_eq!(chat.location(), Coordinates::new(3.0, 4.0).unwrap());

        let message: serde_json::Value =
            serde_json::from_str(&router.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(message["action"], "message");
        assert_eq!(message["sender"], "alice");
        assert_eq!(message["receiver"], "bob");
        assert_eq!(message["text"], "yo");
    }

    #[tokio::test]
    async fn test_run_registers_and_quits() {
        let (mut chat, router) = create_test_client();
        let server = tokio_test::io::Builder::new()
            .read(b"{\"action\":\"register_ack\",\"message\":\"Registered successfully\"}\n")
            .wait(Duration::from_millis(200))
            .build();
        let input = tokio_test::io::Builder::new()
            .wait(Duration::from_millis(50))
            .read(b"/quit\n")
            .build();

        chat.run(BufReader::new(server), BufReader::new(input), Duration::from_secs(60))
            .await
            .unwrap();

        let mut sent = BufReader::new(router).lines();
        let first = sent.next_line().await.unwrap().unwrap();
        assert!(first.contains("\"action\":\"register\""));
    }
}
