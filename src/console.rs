//! Line-oriented operator console
//!
//! Parses one command per line and runs it against the in-process store and
//! session registry.

use codepair_auth::{
    format_code, is_well_formed, normalize_code, PairingStore, SessionId, SessionRegistry,
};

pub const HELP: &str = "\
Commands:
  issue <tenant> <resource> <source>   issue a pairing code
  redeem <code>                        redeem a code (spaces allowed) and open a session
  pair <code>                          same as redeem
  status <code>                        seconds until a code expires
  ping <session-id>                    keep a session alive
  stats                                live codes, rate windows and sessions
  help, ?                              show this text
  quit, exit                           exit";

/// A parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Issue {
        tenant_id: String,
        resource: String,
        source: String,
    },
    Redeem { code: String },
    Status { code: String },
    Ping { session: String },
    Stats,
    Help,
    Quit,
    Empty,
}

impl std::str::FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_lowercase().as_str() {
            "" => Ok(Command::Empty),
            "issue" => {
                let args: Vec<&str> = rest.split_whitespace().collect();
                match args.as_slice() {
                    [tenant_id, resource, source] => Ok(Command::Issue {
                        tenant_id: tenant_id.to_string(),
                        resource: resource.to_string(),
                        source: source.to_string(),
                    }),
                    _ => Err("usage: issue <tenant> <resource> <source>".to_string()),
                }
            }
            "redeem" | "pair" => Ok(Command::Redeem {
                code: normalize_code(rest),
            }),
            "status" => Ok(Command::Status {
                code: normalize_code(rest),
            }),
            "ping" if !rest.is_empty() => Ok(Command::Ping {
                session: rest.to_string(),
            }),
            "ping" => Err("usage: ping <session-id>".to_string()),
            "stats" => Ok(Command::Stats),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command: {} (try 'help')", other)),
        }
    }
}

/// Runs commands against one store and session registry
pub struct Console {
    store: PairingStore,
    sessions: SessionRegistry,
}

impl Console {
    pub fn new(store: PairingStore, sessions: SessionRegistry) -> Self {
        Self { store, sessions }
    }

    /// Execute `command`, returning the text to print
    pub async fn execute(&self, command: Command) -> String {
        match command {
            Command::Issue {
                tenant_id,
                resource,
                source,
            } => match self.store.issue_code(&tenant_id, &resource, &source).await {
                Ok(code) => format!(
                    "code {} (expires in {}s)",
                    format_code(&code),
                    self.store.config().code_ttl_secs
                ),
                Err(e) => format!("error [{}]: {}", e.kind(), e),
            },
            Command::Redeem { code } => {
                if !is_well_formed(&code) {
                    return "error [invalid_code]: code must be 6 digits".to_string();
                }
                match self.store.redeem_code(&code).await {
                    Ok(redemption) => {
                        let session = self.sessions.open(&redemption).await;
                        format!(
                            "paired tenant={} resource={} session={}",
                            redemption.tenant_id, redemption.resource, session.id
                        )
                    }
                    Err(e) => format!("error [{}]: {}", e.kind(), e),
                }
            }
            Command::Status { code } => match self.store.expires_in(&code).await {
                Some(secs) => format!("code {} expires in {}s", format_code(&code), secs),
                None => "no live code".to_string(),
            },
            Command::Ping { session } => {
                let id = match SessionId::parse(&session) {
                    Ok(id) => id,
                    Err(_) => return format!("error: not a session id: {}", session),
                };
                match self.sessions.ping(&id).await {
                    Ok(secs) => format!("session {} expires in {}s", id, secs),
                    Err(e) => format!("error: {}", e),
                }
            }
            Command::Stats => {
                let stats = self.store.stats().await;
                format!(
                    "active codes: {}, rate windows: {}, sessions: {}",
                    stats.active_count,
                    stats.rate_windows,
                    self.sessions.active_count().await
                )
            }
            Command::Help => HELP.to_string(),
            Command::Quit | Command::Empty => String::new(),
        }
    }
}
