//! Wire message types for the game-room and lobby sockets.
//!
//! Outbound frames are typed [`ClientCommand`]s. Inbound frames arrive with
//! their state wrapped at different depths depending on the message type;
//! [`ServerEvent::from_frame`] probes those shapes once and hands everything
//! downstream a single canonical [`Snapshot`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::board::Board;
use crate::engine::legal::LegalMoveSet;
use crate::engine::san;
use crate::engine::types::{AttemptedMove, ChessError, Color};

// ---------------------------------------------------------------------------
// Client → Server commands
// ---------------------------------------------------------------------------

/// Grid coordinate as the server reads it (`r` 0 = rank 8, `c` 0 = file a).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coord {
    pub r: u8,
    pub c: u8,
}

/// Body of an outbound `move` frame. `promo` is a notation letter or empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePayload {
    pub from: Coord,
    pub to: Coord,
    #[serde(default)]
    pub promo: String,
}

/// Commands sent from client to server over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Move {
        #[serde(rename = "move")]
        payload: MovePayload,
    },
    Resign,
    OfferDraw,
    RespondDraw {
        accept: bool,
    },
    SyncRequest,
    Chat {
        message: String,
    },
    LobbySubscribe,
    CreateRoom {
        name: String,
        #[serde(default)]
        password: String,
    },
    JoinRoom {
        name: String,
        #[serde(default)]
        password: String,
    },
}

impl ClientCommand {
    /// Build a `move` frame from an attempted move. Fails only when the
    /// promotion piece has no notation letter.
    pub fn from_move(mv: &AttemptedMove) -> Result<Self, ChessError> {
        let promo = match mv.promotion {
            Some(kind) => san::promotion_letter(kind)?.to_string(),
            None => String::new(),
        };
        Ok(ClientCommand::Move {
            payload: MovePayload {
                from: Coord {
                    r: mv.from.row(),
                    c: mv.from.col(),
                },
                to: Coord {
                    r: mv.to.row(),
                    c: mv.to.col(),
                },
                promo,
            },
        })
    }

    /// Wire discriminator of this command.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientCommand::Move { .. } => "move",
            ClientCommand::Resign => "resign",
            ClientCommand::OfferDraw => "offer_draw",
            ClientCommand::RespondDraw { .. } => "respond_draw",
            ClientCommand::SyncRequest => "sync_request",
            ClientCommand::Chat { .. } => "chat",
            ClientCommand::LobbySubscribe => "lobby_subscribe",
            ClientCommand::CreateRoom { .. } => "create_room",
            ClientCommand::JoinRoom { .. } => "join_room",
        }
    }

    /// JSON object for this command with the bearer credential attached.
    pub fn to_frame(&self, token: &str) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert("token".into(), Value::String(token.to_string()));
        }
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Server → Client events
// ---------------------------------------------------------------------------

/// Declared result of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Side(Color),
    Draw,
}

/// Canonical game-state fields. Every field is optional: a frame only
/// updates what it actually carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub board: Option<Board>,
    pub turn: Option<Color>,
    /// Move history, oldest first.
    pub history: Option<Vec<String>>,
    pub legal_moves: Option<LegalMoveSet>,
    pub check: Option<bool>,
    pub checkmate: Option<bool>,
    pub stalemate: Option<bool>,
    pub game_over: Option<bool>,
    pub winner: Option<Winner>,
    pub reason: Option<String>,
    /// Seconds left on the first-mover's clock.
    pub white_time: Option<f64>,
    /// Seconds left on the second-mover's clock.
    pub black_time: Option<f64>,
}

/// One inbound frame after normalisation.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Connected {
        room: Option<String>,
        /// Player names, first-mover first.
        players: Vec<String>,
        snapshot: Snapshot,
    },
    Sync(Snapshot),
    Move {
        notation: Option<String>,
        snapshot: Snapshot,
    },
    LegalMoves(LegalMoveSet),
    GameOver(Snapshot),
    DrawOffer {
        sender: Option<String>,
    },
    DrawRejected {
        sender: Option<String>,
    },
    PlayerJoined {
        user: Option<String>,
    },
    Chat {
        sender: Option<String>,
        message: String,
    },
    Error {
        detail: String,
    },
    /// A frame type this client does not interpret (lobby traffic etc).
    Other {
        kind: String,
    },
}

impl ServerEvent {
    /// Normalise a parsed frame. Returns `None` when the frame carries no
    /// `type` discriminator.
    pub fn from_frame(frame: &Value) -> Option<Self> {
        let kind = frame.get("type")?.as_str()?;
        let event = match kind {
            "connected" => ServerEvent::Connected {
                room: string_at(frame, "room"),
                players: frame
                    .get("players")
                    .and_then(Value::as_array)
                    .map(|list| list.iter().filter_map(player_name).collect())
                    .unwrap_or_default(),
                snapshot: Snapshot::probe(frame, false),
            },
            "sync" => ServerEvent::Sync(Snapshot::probe(frame, false)),
            "move" => {
                let timed_out = frame
                    .get("move")
                    .and_then(|m| m.get("type"))
                    .and_then(Value::as_str)
                    == Some("game_over");
                if timed_out {
                    ServerEvent::GameOver(Snapshot::probe(frame, false))
                } else {
                    ServerEvent::Move {
                        notation: frame
                            .get("move")
                            .and_then(|m| m.get("info"))
                            .and_then(|info| string_at(info, "san").or_else(|| string_at(info, "move")))
                            .or_else(|| frame.get("move").and_then(|m| string_at(m, "uci"))),
                        snapshot: Snapshot::probe(frame, false),
                    }
                }
            }
            "legal_moves" => {
                ServerEvent::LegalMoves(Snapshot::probe(frame, true).legal_moves.unwrap_or_default())
            }
            "game_over" => ServerEvent::GameOver(Snapshot::probe(frame, false)),
            "draw_offer" => ServerEvent::DrawOffer {
                sender: string_at(frame, "sender"),
            },
            "draw_rejected" => ServerEvent::DrawRejected {
                sender: string_at(frame, "sender"),
            },
            "player_joined" => ServerEvent::PlayerJoined {
                user: string_at(frame, "user"),
            },
            "chat" => ServerEvent::Chat {
                sender: string_at(frame, "sender"),
                message: string_at(frame, "message").unwrap_or_default(),
            },
            "error" => ServerEvent::Error {
                detail: string_at(frame, "detail")
                    .or_else(|| string_at(frame, "message"))
                    .unwrap_or_else(|| "unknown error".to_string()),
            },
            other => ServerEvent::Other {
                kind: other.to_string(),
            },
        };
        Some(event)
    }

    pub fn kind(&self) -> &str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::Sync(_) => "sync",
            ServerEvent::Move { .. } => "move",
            ServerEvent::LegalMoves(_) => "legal_moves",
            ServerEvent::GameOver(_) => "game_over",
            ServerEvent::DrawOffer { .. } => "draw_offer",
            ServerEvent::DrawRejected { .. } => "draw_rejected",
            ServerEvent::PlayerJoined { .. } => "player_joined",
            ServerEvent::Chat { .. } => "chat",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Other { kind } => kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Probing
// ---------------------------------------------------------------------------

impl Snapshot {
    /// Collect snapshot fields from the nesting paths the server uses, in
    /// priority order. Per field, the first path that carries it wins.
    ///
    /// `root_moves_are_legal` marks a `legal_moves` frame, where the root
    /// `moves` key is the legal-move list rather than history.
    fn probe(frame: &Value, root_moves_are_legal: bool) -> Snapshot {
        let nested = |outer: &str, inner: &str| frame.get(outer).and_then(|v| v.get(inner));
        let layers: Vec<&Value> = [
            nested("move", "state"),
            frame.get("move"),
            nested("state", "state"),
            frame.get("state"),
            Some(frame),
        ]
        .into_iter()
        .flatten()
        .filter(|v| v.is_object())
        .collect();

        let find = |key: &str| {
            layers
                .iter()
                .filter_map(|layer| layer.get(key))
                .find(|v| !v.is_null())
        };

        let board = find("board").and_then(|raw| match Board::from_json(raw) {
            Ok(board) => Some(board),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring undecodable board");
                None
            }
        });

        let legal_moves = if root_moves_are_legal {
            frame
                .get("moves")
                .and_then(LegalMoveSet::from_json)
                .or_else(|| find("legal_moves").and_then(LegalMoveSet::from_json))
        } else {
            find("legal_moves").and_then(LegalMoveSet::from_json)
        };

        let history = if root_moves_are_legal {
            None
        } else {
            find("moves").and_then(Value::as_array).map(|items| {
                items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
        };

        // `winner: null` is meaningful (a draw), so presence is checked
        // without skipping nulls.
        let winner = layers
            .iter()
            .find_map(|layer| layer.get("winner"))
            .and_then(|v| match v {
                Value::Null => Some(Winner::Draw),
                Value::String(s) => Color::from_wire(s).map(Winner::Side),
                _ => None,
            });

        Snapshot {
            board,
            turn: find("turn").and_then(Value::as_str).and_then(Color::from_wire),
            history,
            legal_moves,
            check: find("check").and_then(Value::as_bool),
            checkmate: find("checkmate").and_then(Value::as_bool),
            stalemate: find("stalemate").and_then(Value::as_bool),
            game_over: find("game_over").and_then(Value::as_bool),
            winner,
            reason: find("reason").and_then(Value::as_str).map(str::to_string),
            white_time: find("white_time").and_then(Value::as_f64),
            black_time: find("black_time").and_then(Value::as_f64),
        }
    }
}

fn string_at(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Players arrive as bare usernames, or as objects with a `username`.
fn player_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => string_at(value, "username"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::san::name_to_square;
    use crate::engine::types::PieceType;
    use serde_json::json;

    // -------------------------------------------------------------------
    // Outbound
    // -------------------------------------------------------------------

    #[test]
    fn move_command_shape() {
        let mv = AttemptedMove::new(name_to_square("e2").unwrap(), name_to_square("e4").unwrap());
        let frame = ClientCommand::from_move(&mv).unwrap().to_frame("tok").unwrap();
        assert_eq!(
            frame,
            json!({
                "type": "move",
                "move": {"from": {"r": 6, "c": 4}, "to": {"r": 4, "c": 4}, "promo": ""},
                "token": "tok"
            })
        );
    }

    #[test]
    fn promotion_uses_notation_letter() {
        let mv = AttemptedMove::new(name_to_square("a7").unwrap(), name_to_square("a8").unwrap())
            .with_promotion(PieceType::Knight)
            .unwrap();
        let frame = ClientCommand::from_move(&mv).unwrap().to_frame("t").unwrap();
        assert_eq!(frame["move"]["promo"], "S");
    }

    #[test]
    fn simple_commands_carry_token() {
        let frame = ClientCommand::Resign.to_frame("abc").unwrap();
        assert_eq!(frame, json!({"type": "resign", "token": "abc"}));

        let frame = ClientCommand::RespondDraw { accept: true }.to_frame("abc").unwrap();
        assert_eq!(frame["type"], "respond_draw");
        assert_eq!(frame["accept"], true);

        let frame = ClientCommand::SyncRequest.to_frame("abc").unwrap();
        assert_eq!(frame["type"], "sync_request");
        assert_eq!(ClientCommand::OfferDraw.kind(), "offer_draw");
    }

    #[test]
    fn lobby_commands_serialize() {
        let frame = ClientCommand::CreateRoom {
            name: "r1".into(),
            password: String::new(),
        }
        .to_frame("t")
        .unwrap();
        assert_eq!(frame["type"], "create_room");
        assert_eq!(frame["name"], "r1");
        assert_eq!(frame["password"], "");
    }

    #[test]
    fn commands_deserialize_from_wire() {
        let cmd: ClientCommand = serde_json::from_value(json!({
            "type": "move",
            "move": {"from": {"r": 6, "c": 4}, "to": {"r": 4, "c": 4}, "promo": ""},
            "token": "x"
        }))
        .unwrap();
        assert!(matches!(cmd, ClientCommand::Move { payload } if payload.to == Coord { r: 4, c: 4 }));
    }

    // -------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------

    fn start_state() -> Value {
        json!({
            "board": Board::starting().to_json(),
            "moves": [],
            "legal_moves": ["e4", "Sf3", "e3"],
            "check": false,
            "checkmate": false,
            "stalemate": false,
        })
    }

    #[test]
    fn connected_frame_reads_nested_state() {
        let frame = json!({
            "type": "connected",
            "room": "r1",
            "state": {"state": start_state(), "turn": "b"},
            "players": ["alice", "bob"],
        });
        let ServerEvent::Connected {
            room,
            players,
            snapshot,
        } = ServerEvent::from_frame(&frame).unwrap()
        else {
            panic!("expected connected");
        };
        assert_eq!(room.as_deref(), Some("r1"));
        assert_eq!(players, ["alice", "bob"]);
        assert_eq!(snapshot.board, Some(Board::starting()));
        assert_eq!(snapshot.turn, Some(Color::FirstMover));
        assert_eq!(snapshot.history, Some(vec![]));
        assert_eq!(snapshot.legal_moves.unwrap().len(), 3);
        assert_eq!(snapshot.check, Some(false));
        assert_eq!(snapshot.winner, None);
    }

    #[test]
    fn move_frame_reads_move_state() {
        let mut state = start_state();
        state["moves"] = json!(["e4"]);
        let frame = json!({
            "type": "move",
            "move": {"uci": "e2e4", "info": {}, "state": state},
        });
        let ServerEvent::Move { notation, snapshot } = ServerEvent::from_frame(&frame).unwrap() else {
            panic!("expected move");
        };
        assert_eq!(notation.as_deref(), Some("e2e4"));
        assert_eq!(snapshot.history, Some(vec!["e4".to_string()]));
        assert_eq!(snapshot.turn, None);
        assert!(snapshot.board.is_some());
    }

    #[test]
    fn timeout_move_becomes_game_over() {
        let frame = json!({
            "type": "move",
            "move": {"type": "game_over", "state": {"game_over": true, "winner": "c", "reason": "timeout", "white_time": 0}},
        });
        let ServerEvent::GameOver(snapshot) = ServerEvent::from_frame(&frame).unwrap() else {
            panic!("expected game over");
        };
        assert_eq!(snapshot.winner, Some(Winner::Side(Color::SecondMover)));
        assert_eq!(snapshot.reason.as_deref(), Some("timeout"));
        assert_eq!(snapshot.white_time, Some(0.0));
    }

    #[test]
    fn legal_moves_alternate_keys() {
        let shapes = [
            json!({"type": "legal_moves", "moves": ["e4"]}),
            json!({"type": "legal_moves", "legal_moves": ["e4"]}),
            json!({"type": "legal_moves", "state": {"state": {"legal_moves": ["e4"]}}}),
            json!({"type": "legal_moves", "state": {"legal_moves": ["e4"]}}),
        ];
        for frame in shapes {
            let ServerEvent::LegalMoves(set) = ServerEvent::from_frame(&frame).unwrap() else {
                panic!("expected legal moves for {frame}");
            };
            assert!(set.contains("e4"), "{frame}");
        }
    }

    #[test]
    fn legal_moves_frame_without_list_is_empty() {
        let frame = json!({"type": "legal_moves"});
        assert_eq!(
            ServerEvent::from_frame(&frame),
            Some(ServerEvent::LegalMoves(LegalMoveSet::default()))
        );
    }

    #[test]
    fn game_over_null_winner_is_draw() {
        let frame = json!({"type": "game_over", "state": {"game_over": true, "winner": null, "reason": "agreement"}});
        let ServerEvent::GameOver(snapshot) = ServerEvent::from_frame(&frame).unwrap() else {
            panic!("expected game over");
        };
        assert_eq!(snapshot.winner, Some(Winner::Draw));
        assert_eq!(snapshot.game_over, Some(true));
    }

    #[test]
    fn partial_frame_leaves_fields_absent() {
        let frame = json!({"type": "sync", "state": {"state": {"check": true}}});
        let ServerEvent::Sync(snapshot) = ServerEvent::from_frame(&frame).unwrap() else {
            panic!("expected sync");
        };
        assert_eq!(snapshot.check, Some(true));
        assert!(snapshot.board.is_none());
        assert!(snapshot.history.is_none());
        assert!(snapshot.turn.is_none());
    }

    #[test]
    fn undecodable_board_is_dropped() {
        let frame = json!({"type": "sync", "state": {"state": {"board": "garbage", "check": false}}});
        let ServerEvent::Sync(snapshot) = ServerEvent::from_frame(&frame).unwrap() else {
            panic!("expected sync");
        };
        assert!(snapshot.board.is_none());
        assert_eq!(snapshot.check, Some(false));
    }

    #[test]
    fn error_detail_or_message() {
        assert_eq!(
            ServerEvent::from_frame(&json!({"type": "error", "detail": "illegal move"})),
            Some(ServerEvent::Error {
                detail: "illegal move".into()
            })
        );
        assert_eq!(
            ServerEvent::from_frame(&json!({"type": "error", "message": "auth required"})),
            Some(ServerEvent::Error {
                detail: "auth required".into()
            })
        );
    }

    #[test]
    fn social_frames() {
        assert_eq!(
            ServerEvent::from_frame(&json!({"type": "chat", "message": "hi", "sender": "bob"})),
            Some(ServerEvent::Chat {
                sender: Some("bob".into()),
                message: "hi".into()
            })
        );
        assert_eq!(
            ServerEvent::from_frame(&json!({"type": "draw_offer", "sender": "bob", "sender_id": 2})),
            Some(ServerEvent::DrawOffer {
                sender: Some("bob".into())
            })
        );
        assert_eq!(
            ServerEvent::from_frame(&json!({"type": "player_joined", "user": "anon"}))
                .unwrap()
                .kind(),
            "player_joined"
        );
    }

    #[test]
    fn untyped_and_unknown_frames() {
        assert_eq!(ServerEvent::from_frame(&json!({"state": {}})), None);
        assert_eq!(ServerEvent::from_frame(&json!([1, 2])), None);
        assert_eq!(
            ServerEvent::from_frame(&json!({"type": "room_list", "rooms": []})),
            Some(ServerEvent::Other {
                kind: "room_list".into()
            })
        );
    }
}
