//! Simple Packet Terminal - a thin interactive console over [`axlink`].
//!
//! This binary owns only argument parsing, a line-reading loop, and command
//! dispatch; the KISS/AX.25 protocol work all lives in the `axlink` crate.

use anyhow::{Context, Result};
use axlink::{AxEngine, Callsign, EngineConfig, EngineEvent};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;

/// KISS TNC host:port default (Direwolf's default port).
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8001;

#[derive(Parser)]
#[command(name = "spt", version, about = "Simple Packet Terminal - interactive KISS/AX.25 console")]
struct Cli {
    /// This station's callsign, e.g. N0CALL or N0CALL-5.
    mycall: String,

    /// Station to connect to on startup.
    target: Option<String>,

    /// KISS TNC host.
    #[arg(default_value = DEFAULT_HOST)]
    host: String,

    /// KISS TNC TCP port.
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,
}

const HELP: &str = "\
Commands:
  /c | /connect CALL [via DIGI1,DIGI2]   Connect (AX.25)
  /d | /disconnect                       Disconnect
  /unproto DEST [via DIGI1,DIGI2] [msg]  Send UI frame; no msg -> enter unproto mode
  /upexit                                 Exit unproto mode
  /echo on|off                            Toggle local echo
  /crlf on|off                            Toggle CRLF line endings
  /retries N                               Set connect retries (default 3)
  /status                                  Show connection status
  /h | /help                               This help
  /q | /quit                                Quit
";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mycall: Callsign = cli.mycall.parse().context("invalid callsign")?;
    let config = EngineConfig::new(cli.host, cli.port, mycall);

    let (engine, events) = AxEngine::connect(config)
        .await
        .with_context(|| "failed to connect to KISS host")?;
    tokio::spawn(print_events(events));

    if let Some(target) = cli.target {
        match parse_dest(&target) {
            Ok((dest, digis)) => {
                if let Err(e) = engine.call(dest, digis).await {
                    println!("[ERROR] {e}");
                }
            }
            Err(e) => println!("[ERROR] {e}"),
        }
    }

    run_repl(&engine).await
}

async fn print_events(mut events: impl tokio_stream::Stream<Item = EngineEvent> + Unpin) {
    while let Some(event) = events.next().await {
        match event {
            EngineEvent::Status(s) => println!("{s}"),
            EngineEvent::Rx(line) => println!("{line}"),
            EngineEvent::RxUi { src, dest, text } => println!("[RX UI] {src} > {dest} :: {text}"),
            EngineEvent::Connected { peer } => println!("[LINK] Connected to {peer}"),
            EngineEvent::Disconnected { reason } => println!("[LINK] {reason}"),
            EngineEvent::PagerPrompt => {}
        }
    }
}

async fn run_repl(engine: &AxEngine) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(raw) = lines.next_line().await? else {
            break;
        };
        let cmd = raw.trim();
        let low = cmd.to_lowercase();
        let status = engine.status().await;

        if cmd.is_empty() {
            if status.pager_pending {
                engine.pager_continue().await.ok();
            }
            continue;
        }
        if status.pager_pending && (low == "a" || low == "abort") {
            engine.pager_abort().await.ok();
            continue;
        }

        let mut toks = cmd.split_whitespace();
        let ftok = toks.next().unwrap_or("").to_lowercase();
        let rest: Vec<&str> = toks.collect();

        match ftok.as_str() {
            "/q" | "/quit" | "/exit" => {
                engine.disconnect().await;
                break;
            }
            "/h" | "/help" => println!("{HELP}"),
            "/d" | "/disconnect" => engine.disconnect().await,
            "/c" | "/connect" => {
                let Some(dest) = rest.first() else {
                    println!("Usage: /connect <DEST> [via DIGI1,DIGI2]");
                    continue;
                };
                match parse_dest_and_digis(dest, &rest[1..]) {
                    Ok((dest, digis)) => {
                        if let Err(e) = engine.call(dest, digis).await {
                            println!("[ERROR] {e}");
                        }
                    }
                    Err(e) => println!("[ERROR] {e}"),
                }
            }
            "/unproto" => {
                let Some(dest_str) = rest.first() else {
                    println!("Usage: /unproto DEST [via DIGI1,DIGI2] [msg]");
                    continue;
                };
                match parse_unproto(dest_str, &rest[1..]) {
                    Ok((dest, digis, msg)) => match msg {
                        Some(msg) => {
                            if let Err(e) = engine.send_unproto(dest, digis, &msg).await {
                                println!("[ERROR] {e}");
                            }
                        }
                        None => {
                            engine.enter_unproto(dest, digis).await;
                            println!("[UNPROTO] Entered persistent unproto mode to {dest_str}.");
                        }
                    },
                    Err(e) => println!("[ERROR] {e}"),
                }
            }
            "/upexit" => {
                engine.exit_unproto().await;
                println!("[UNPROTO] Exited unproto mode.");
            }
            "/echo" => match rest.first().copied() {
                Some("on") => engine.set_local_echo(true).await,
                Some("off") => engine.set_local_echo(false).await,
                _ => println!("Usage: /echo on|off"),
            },
            "/crlf" => match rest.first().copied() {
                Some("on") => engine.set_crlf(true).await,
                Some("off") => engine.set_crlf(false).await,
                _ => println!("Usage: /crlf on|off"),
            },
            "/retries" => match rest.first().and_then(|s| s.parse::<u32>().ok()) {
                Some(n) => engine.set_retries(n).await,
                None => println!("Usage: /retries N"),
            },
            "/status" => print_status(engine).await,
            _ if cmd.starts_with('/') => println!("Unknown command. Try /help."),
            _ => {
                if status.unproto_mode && status.unproto_dest.is_some() {
                    engine.send_unproto_persistent(cmd).await.ok();
                    continue;
                }
                if let Err(e) = engine.send_text(cmd).await {
                    println!("[ERROR] {e}");
                }
            }
        }
    }
    Ok(())
}

async fn print_status(engine: &AxEngine) {
    let s = engine.status().await;
    println!("Status:");
    println!("  state       = {}", s.state);
    println!("  peer        = {}", s.peer.as_deref().unwrap_or("(none)"));
    println!("  unproto     = {} (to={})", s.unproto_mode, s.unproto_dest.as_deref().unwrap_or("(none)"));
    println!("  local_echo  = {}", s.local_echo);
    println!("  crlf        = {}", s.crlf);
    println!("  retries     = {}", s.retries);
    println!("  pager_pend  = {}", s.pager_pending);
}

/// Parse `"DEST"` plus trailing `via D1,D2` tokens.
fn parse_dest_and_digis(dest: &str, rest: &[&str]) -> Result<(Callsign, Vec<Callsign>)> {
    let dest: Callsign = dest.parse()?;
    let digis = if rest.len() >= 2 && rest[0].eq_ignore_ascii_case("via") {
        rest[1]
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().parse())
            .collect::<std::result::Result<Vec<_>, _>>()?
    } else {
        Vec::new()
    };
    Ok((dest, digis))
}

fn parse_dest(target: &str) -> Result<(Callsign, Vec<Callsign>)> {
    parse_dest_and_digis(target, &[])
}

fn parse_unproto(dest: &str, rest: &[&str]) -> Result<(Callsign, Vec<Callsign>, Option<String>)> {
    let dest: Callsign = dest.parse()?;
    if rest.len() >= 2 && rest[0].eq_ignore_ascii_case("via") {
        let digis = rest[1]
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().parse())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let msg = if rest.len() > 2 { Some(rest[2..].join(" ")) } else { None };
        Ok((dest, digis, msg))
    } else {
        let msg = if !rest.is_empty() { Some(rest.join(" ")) } else { None };
        Ok((dest, Vec::new(), msg))
    }
}
