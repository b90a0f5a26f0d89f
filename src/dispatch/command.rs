use crate::dispatch::error::DispatchError;
use std::fmt;
use std::str::FromStr;

/// A node command, as named in both the dispatcher and the node routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Configure,
    Start,
    Stop,
    Restart,
    CheckAlive,
    Inspect,
    Clean,
}

impl Command {
    pub const ALL: [Command; 7] = [
        Command::Configure,
        Command::Start,
        Command::Stop,
        Command::Restart,
        Command::CheckAlive,
        Command::Inspect,
        Command::Clean,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Configure => "configure",
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Restart => "restart",
            Command::CheckAlive => "check-alive",
            Command::Inspect => "inspect",
            Command::Clean => "clean",
        }
    }

    /// Only start, stop and restart can target a single container
    pub fn accepts_container(self) -> bool {
        matches!(self, Command::Start | Command::Stop | Command::Restart)
    }

    /// Whether the node call carries the configuration as a POST body
    pub fn carries_body(self) -> bool {
        matches!(self, Command::Configure)
    }

    /// Path of the node route, e.g. `/restart/app`
    pub fn node_path(self, container: Option<&str>) -> String {
        match container {
            Some(container) if self.accepts_container() => {
                format!("/{}/{}", self.as_str(), container)
            }
            _ => format!("/{}", self.as_str()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| DispatchError::UnknownCommand(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_command() {
        for command in Command::ALL {
            assert_eq!(command.as_str().parse::<Command>().unwrap(), command);
        }
        assert!("deploy".parse::<Command>().is_err());
    }

    #[test]
    fn test_node_path() {
        assert_eq!(Command::Start.node_path(None), "/start");
        assert_eq!(Command::Restart.node_path(Some("app")), "/restart/app");
        assert_eq!(Command::CheckAlive.node_path(None), "/check-alive");
        // a container is never appended for commands that do not take one
        assert_eq!(Command::Inspect.node_path(Some("app")), "/inspect");
    }
}
