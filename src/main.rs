use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use chess_online_client::config::ClientConfig;
use chess_online_client::engine::san;
use chess_online_client::engine::types::Color;
use chess_online_client::game::{ClickOutcome, ViewModel};
use chess_online_client::ws::{SessionEvent, WsConnector};
use chess_online_client::GameClient;

const HELP: &str = "commands: <from> <to> | promote <S|G|W|H> | resign | draw | accept | decline | sync | say <text> | board | quit";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chess_online_client=info".into()),
        )
        .init();

    let config = ClientConfig::from_env();
    let mut client = GameClient::new(&config, WsConnector);

    info!(
        "chess-online-client v{} joining {} at {}",
        env!("CARGO_PKG_VERSION"),
        config.room,
        config.ws_host
    );
    if let Err(e) = client.join(&config.room) {
        error!(error = %e, "cannot join; set CHESS_ACCESS_TOKEN");
        std::process::exit(1);
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            events = client.step() => report(client.view(), &events),
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !run_command(&mut client, line.trim()) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "stdin closed");
                    break;
                }
            },
        }
    }

    client.leave();
}

/// Execute one input line. Returns false to quit.
fn run_command(client: &mut GameClient<WsConnector>, line: &str) -> bool {
    let mut words = line.split_whitespace();
    let result = match words.next() {
        None => return true,
        Some("quit") | Some("exit") => return false,
        Some("board") => {
            print_board(client.view());
            Ok(())
        }
        Some("resign") => client.resign(),
        Some("draw") => client.offer_draw(),
        Some("accept") => client.respond_draw(true),
        Some("decline") => client.respond_draw(false),
        Some("sync") => client.request_sync(),
        Some("say") => {
            let text = line.trim_start_matches("say").trim();
            client.chat(text)
        }
        Some("promote") => {
            let piece = words
                .next()
                .and_then(|w| w.chars().next())
                .and_then(|c| san::piece_from_letter(c.to_ascii_uppercase()));
            match piece {
                Some(piece) => client.choose_promotion(piece).map(|o| print_outcome(&o)),
                None => {
                    println!("promote with one of S G W H");
                    Ok(())
                }
            }
        }
        Some(from) => {
            let squares = (san::name_to_square(from), words.next().and_then(san::name_to_square));
            match squares {
                (Some(from), Some(to)) => client.click(from).and_then(|first| {
                    print_outcome(&first);
                    if matches!(first, ClickOutcome::Selected { .. }) {
                        client.click(to).map(|o| print_outcome(&o))
                    } else {
                        Ok(())
                    }
                }),
                _ => {
                    println!("{HELP}");
                    Ok(())
                }
            }
        }
    };
    if let Err(e) = result {
        warn!(error = %e, "command failed");
    }
    true
}

fn print_outcome(outcome: &ClickOutcome) {
    match outcome {
        ClickOutcome::Rejected(rejection) => println!("rejected: {rejection}"),
        ClickOutcome::PromotionRequired { from, to } => {
            println!("{from}{to} promotes: choose with `promote <S|G|W|H>`")
        }
        ClickOutcome::Submitted(cmd) => println!("sent {}", cmd.notation),
        ClickOutcome::Selected { .. } | ClickOutcome::Deselected | ClickOutcome::Ignored => {}
    }
}

fn report(view: &ViewModel, events: &[SessionEvent]) {
    for event in events {
        match event {
            SessionEvent::Open { room } => println!("connected to {room}"),
            SessionEvent::Reconnecting { delay_ms, .. } => {
                println!("connection lost, retrying in {delay_ms} ms")
            }
            SessionEvent::AuthFailed { .. } => println!("access token rejected"),
            SessionEvent::Frame { kind, .. } => match kind.as_str() {
                "connected" | "sync" | "move" | "game_over" => print_board(view),
                "draw_offer" => {
                    if let Some(sender) = view.pending_draw_offer() {
                        println!("{sender} offers a draw: accept or decline");
                    }
                }
                "chat" => {
                    if let Some(line) = view.chat().last() {
                        println!(
                            "<{}> {}",
                            line.sender.as_deref().unwrap_or("?"),
                            line.message
                        );
                    }
                }
                "player_joined" | "draw_rejected" => {
                    if let Some(notice) = view.notices().last() {
                        println!("{notice}");
                    }
                }
                "error" => {
                    if let Some(detail) = view.last_error() {
                        println!("server: {detail}");
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
}

fn print_board(view: &ViewModel) {
    println!("{}", view.board().render());
    if let Some(outcome) = view.outcome_text() {
        println!("game over: {outcome}");
        return;
    }
    let side = match view.turn() {
        Some(Color::FirstMover) => "first mover",
        Some(Color::SecondMover) => "second mover",
        None => "unknown",
    };
    let check = if view.check() { " (check)" } else { "" };
    let you = if view.is_local_turn() { ", your move" } else { "" };
    println!("to move: {side}{check}{you}");
    if let Some(last) = view.last_move() {
        println!("last move: {last}");
    }
    let clocks = view.clocks();
    if let (Some(first), Some(second)) = (clocks.first_mover, clocks.second_mover) {
        println!("clocks: {first:.0}s / {second:.0}s");
    }
}
