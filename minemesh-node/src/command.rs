//! Console commands typed on stdin.
//!
//! Lines starting with `/` are commands; anything else is posted as chat.

use minemesh_sync::{PeerId, Preset, SessionConfig, TimerConfig};
use thiserror::Error;

pub const HELP: &str = "\
/connect <ws://host:port>          link to a peer
/config <preset>                   beginner | intermediate | expert
/config custom <w> <h> <bombs> [minutes]
/start                             start a session with the current config
/reveal <x> <y>    /flag <x> <y>   play a move
/end [reason]                      end the session
/board   /who   /leave   /quit     inspect or disconnect
anything else                      chat";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect(PeerId),
    Config(SessionConfig),
    Start,
    Reveal { x: u32, y: u32 },
    Flag { x: u32, y: u32 },
    End(Option<String>),
    Board,
    Who,
    Leave,
    Quit,
    Help,
    Chat(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command /{0}, try /help")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("`{0}` is not a number")]
    NotANumber(String),
}

fn number(arg: Option<&str>, usage: &'static str) -> Result<u32, CommandError> {
    let arg = arg.ok_or(CommandError::Usage(usage))?;
    arg.parse().map_err(|_| CommandError::NotANumber(arg.to_string()))
}

fn cell(args: &[&str], usage: &'static str) -> Result<(u32, u32), CommandError> {
    Ok((number(args.first().copied(), usage)?, number(args.get(1).copied(), usage)?))
}

/// Parse one input line. Returns `None` for blank lines.
pub fn parse(line: &str) -> Option<Result<Command, CommandError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Ok(Command::Chat(line.to_string())));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    let command = match name {
        "connect" => match args.as_slice() {
            [target] => Ok(Command::Connect(PeerId::from(*target))),
            _ => Err(CommandError::Usage("/connect <ws://host:port>")),
        },
        "config" => config(&args),
        "start" => Ok(Command::Start),
        "reveal" => cell(&args, "/reveal <x> <y>").map(|(x, y)| Command::Reveal { x, y }),
        "flag" => cell(&args, "/flag <x> <y>").map(|(x, y)| Command::Flag { x, y }),
        "end" => Ok(Command::End((!args.is_empty()).then(|| args.join(" ")))),
        "board" => Ok(Command::Board),
        "who" => Ok(Command::Who),
        "leave" => Ok(Command::Leave),
        "quit" | "exit" => Ok(Command::Quit),
        "help" => Ok(Command::Help),
        other => Err(CommandError::Unknown(other.to_string())),
    };
    Some(command)
}

fn config(args: &[&str]) -> Result<Command, CommandError> {
    const USAGE: &str = "/config <beginner|intermediate|expert> | /config custom <w> <h> <bombs> [minutes]";
    let preset = args.first().and_then(|p| Preset::parse(p)).ok_or(CommandError::Usage(USAGE))?;
    if preset != Preset::Custom {
        return Ok(Command::Config(SessionConfig::preset(preset)));
    }

    let width = number(args.get(1).copied(), USAGE)?;
    let height = number(args.get(2).copied(), USAGE)?;
    let bombs = number(args.get(3).copied(), USAGE)?;
    let timer = match args.get(4) {
        Some(minutes) => TimerConfig::minutes(number(Some(*minutes), USAGE)?),
        None => TimerConfig::disabled(),
    };
    Ok(Command::Config(SessionConfig::custom(width, height, bombs, timer)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_chat() {
        assert_eq!(parse("  gl hf "), Some(Ok(Command::Chat("gl hf".into()))));
        assert_eq!(parse("   "), None);
    }

    #[test]
    fn test_moves() {
        assert_eq!(parse("/reveal 3 4"), Some(Ok(Command::Reveal { x: 3, y: 4 })));
        assert_eq!(parse("/flag 0 8"), Some(Ok(Command::Flag { x: 0, y: 8 })));
        assert_eq!(
            parse("/reveal 3"),
            Some(Err(CommandError::Usage("/reveal <x> <y>")))
        );
        assert_eq!(
            parse("/flag a 1"),
            Some(Err(CommandError::NotANumber("a".into())))
        );
    }

    #[test]
    fn test_config_presets_and_custom() {
        assert_eq!(
            parse("/config Expert"),
            Some(Ok(Command::Config(SessionConfig::preset(Preset::Expert))))
        );
        assert_eq!(
            parse("/config custom 12 10 20 4"),
            Some(Ok(Command::Config(SessionConfig::custom(
                12,
                10,
                20,
                TimerConfig::minutes(4)
            ))))
        );
        assert!(matches!(parse("/config huge"), Some(Err(CommandError::Usage(_)))));
    }

    #[test]
    fn test_end_reason_and_unknown() {
        assert_eq!(parse("/end"), Some(Ok(Command::End(None))));
        assert_eq!(parse("/end out of time"), Some(Ok(Command::End(Some("out of time".into())))));
        assert_eq!(parse("/dance"), Some(Err(CommandError::Unknown("dance".into()))));
    }

    #[test]
    fn test_connect_target() {
        assert_eq!(
            parse("/connect ws://10.0.0.2:9000"),
            Some(Ok(Command::Connect(PeerId::from("ws://10.0.0.2:9000"))))
        );
    }
}
