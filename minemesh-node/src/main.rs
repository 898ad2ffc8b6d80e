//! minemesh node: one peer on a WebSocket listener, driven from stdin.
//!
//! ```text
//! stdin lines ──► Command ──► Peer ──► links
//! links ──► TransportEvent ──► Peer ──► Notification ──► stdout
//! ```
//!
//! Everything runs on one task; `select!` hands the peer one event at a
//! time.

mod command;

use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;

use clap::Parser;
use log::info;
use minemesh_board::{Board, RandomBoard, RevealOutcome};
use minemesh_sync::protocol::now_millis;
use minemesh_sync::{
    Notification, Peer, PeerConfig, PeerId, ProfileColor, SessionState, SyncError, WsConfig, WsTransport, PALETTE,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use command::{Command, HELP};

/// Peer-to-peer minesweeper node
#[derive(Parser, Debug)]
#[command(name = "minemesh-node")]
#[command(about = "Peer-to-peer minesweeper node")]
struct Args {
    /// Display name announced to other players
    #[arg(short, long, default_value = "Player")]
    name: String,

    /// Palette color (Red, Blue, Green, ...); picked from the peer id when unset
    #[arg(short, long)]
    color: Option<String>,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:9000")]
    bind: String,

    /// Host to put in the peer id instead of the bound IP
    #[arg(long)]
    host: Option<String>,

    /// Peers to dial at startup
    #[arg(long)]
    connect: Vec<String>,
}

fn palette_color(name: &str) -> Result<ProfileColor, String> {
    PALETTE
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(n, v)| ProfileColor::new(*n, *v))
        .ok_or_else(|| {
            let names: Vec<&str> = PALETTE.iter().map(|(n, _)| *n).collect();
            format!("unknown color {name}, pick one of {}", names.join(", "))
        })
}

/// What the console remembers between notifications.
#[derive(Default)]
struct Console {
    /// Names survive a peer leaving so departures can be printed
    names: HashMap<PeerId, String>,
    /// Wall-clock milliseconds at which the running game times out
    deadline: Option<u64>,
}

impl Console {
    fn name(&self, id: &PeerId) -> String {
        self.names.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    fn show(&mut self, note: Notification) {
        match note {
            Notification::PeerJoined(id) => println!("* linked to {id}"),
            Notification::PeerLeft(id) => println!("* link to {id} closed"),
            Notification::PresenceChanged(profile) => {
                println!("* {} ({}) is here", profile.name, profile.color.name);
                self.names.insert(profile.id, profile.name);
            }
            Notification::UserLeft(id) => println!("* {} left", self.name(&id)),
            Notification::ChatAppended(entry) => println!("[{}] {}", self.name(&entry.sender), entry.text),
            Notification::ConfigChanged(c) => {
                println!("* config: {:?} {}x{}, {} bombs", c.preset, c.width, c.height, c.bombs)
            }
            Notification::ConfigConflict { from } => {
                println!("* ignored config from {} during a game", self.name(&from))
            }
            Notification::SessionStarted(state) => {
                self.deadline = deadline(&state);
                println!("* game on!");
                print!("{}", render(&state.board));
            }
            Notification::SessionUpdated { .. } => {}
            Notification::SessionEnded { reason } => {
                self.deadline = None;
                println!("* game over{}", reason.map(|r| format!(": {r}")).unwrap_or_default());
            }
            Notification::ConnectionError(e) => println!("! {e}"),
        }
    }
}

/// Timeout counted from the session's start, so a late joiner gets only
/// the time that is left.
fn deadline(state: &SessionState) -> Option<u64> {
    state
        .config
        .time_limit()
        .map(|limit| state.started_at + limit.as_millis() as u64)
}

/// ASCII view: `#` hidden, `F` flag, `*` bomb, digit or `.` when revealed.
fn render(board: &Board) -> String {
    let mut out = String::new();
    for y in 0..board.height {
        for x in 0..board.width {
            let glyph = match board.cell(x, y) {
                Some(c) if c.flagged => 'F',
                Some(c) if !c.revealed => '#',
                Some(c) if c.bomb => '*',
                Some(c) if c.adjacent > 0 => char::from(b'0' + c.adjacent),
                _ => '.',
            };
            out.push(glyph);
        }
        out.push('\n');
    }
    out
}

fn current_board(peer: &Peer<WsTransport>) -> Result<Board, SyncError> {
    peer.session()
        .state()
        .map(|s| s.board.clone())
        .ok_or(SyncError::NoActiveSession)
}

fn reveal(peer: &mut Peer<WsTransport>, x: u32, y: u32) -> Result<(), Box<dyn Error>> {
    let mut board = current_board(peer)?;
    match board.reveal(x, y)? {
        RevealOutcome::Unchanged => {}
        RevealOutcome::Revealed(_) => {
            let cleared = board.is_cleared();
            print!("{}", render(&board));
            peer.update_board(board)?;
            if cleared {
                peer.end(Some("board cleared".to_string()));
            }
        }
        RevealOutcome::Detonated => {
            peer.update_board(board)?;
            peer.end(Some(format!("{} hit a mine", peer.profile().name)));
        }
    }
    Ok(())
}

fn flag(peer: &mut Peer<WsTransport>, x: u32, y: u32) -> Result<(), Box<dyn Error>> {
    let mut board = current_board(peer)?;
    board.toggle_flag(x, y)?;
    peer.update_board(board)?;
    Ok(())
}

/// Run one command. Returns `false` when the node should exit.
fn run(peer: &mut Peer<WsTransport>, command: Command) -> bool {
    let result: Result<(), Box<dyn Error>> = match command {
        Command::Connect(target) => peer.connect(&target).map(|_| ()).map_err(Into::into),
        Command::Config(config) => peer.update_config(config).map_err(Into::into),
        Command::Start => peer
            .start_with(&RandomBoard::default())
            .map(|_| ())
            .map_err(Into::into),
        Command::Reveal { x, y } => reveal(peer, x, y),
        Command::Flag { x, y } => flag(peer, x, y),
        Command::End(reason) => {
            if !peer.end(reason) {
                println!("no game to end");
            }
            Ok(())
        }
        Command::Board => current_board(peer)
            .map(|board| print!("{}", render(&board)))
            .map_err(Into::into),
        Command::Who => {
            for entry in peer.directory().iter() {
                let linked = peer.registry().is_open(&entry.profile.id);
                println!("  {} {:?}{}", entry.profile.name, entry.origin, if linked { " (linked)" } else { "" });
            }
            Ok(())
        }
        Command::Leave => {
            peer.disconnect_all();
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Chat(text) => {
            peer.post(text);
            Ok(())
        }
        Command::Quit => return false,
    };
    if let Err(e) = result {
        println!("! {e}");
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let color = args.color.as_deref().map(palette_color).transpose()?;
    let (transport, mut events) = WsTransport::bind(WsConfig {
        bind_addr: args.bind,
        advertise_host: args.host,
    })
    .await?;
    let mut peer = Peer::new(
        transport,
        PeerConfig {
            name: args.name,
            color,
            ..PeerConfig::default()
        },
    )?;
    let mut notes = peer.take_notifications().ok_or("notification stream already taken")?;
    let mut console = Console::default();

    println!("You are {} at {}. Type /help for commands.", peer.profile().name, peer.id());
    for target in args.connect {
        if let Err(e) = peer.connect(&PeerId::from(target)) {
            log::warn!("{e}");
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            Some(event) = events.recv() => peer.handle_event(event),
            Some(note) = notes.recv() => console.show(note),
            line = lines.next_line() => match line? {
                Some(line) => match command::parse(&line) {
                    Some(Ok(command)) => {
                        if !run(&mut peer, command) {
                            break;
                        }
                    }
                    Some(Err(e)) => println!("! {e}"),
                    None => {}
                },
                None => break,
            },
            _ = tick.tick() => {
                if console.deadline.is_some_and(|d| now_millis() >= d) {
                    console.deadline = None;
                    peer.end(Some("time is up".to_string()));
                }
            }
        }
    }

    peer.disconnect_all();
    info!("Node {} stopped", peer.id());
    Ok(())
}
