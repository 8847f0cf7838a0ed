//! Line-oriented console front end.
//!
//! Commands are read from stdin, one per line; every [`ClientEvent`] is
//! printed to stdout as a JSON line so the output can be piped into a map
//! renderer or inspected with `jq`.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

use convoy_core::{ClientCommand, ClientEvent};
use convoy_shared::{AnnotationId, GeoPoint, ParticipantId};

pub const HELP: &str = "\
commands:
  select <participant-id>     focus a participant
  dismiss                     close the selection card
  drag                        stop following (as if the map was dragged)
  locate                      fly to my position and follow
  follow                      toggle auto-follow
  clear-trail                 (host) clear the leader trail
  pin                         (host) start placing an annotation
  cancel                      stop placing
  place <lat> <lng> <text>    (host) place an annotation
  edit <annotation-id> <text> (host) change an annotation
  delete <annotation-id>      (host) ask to delete an annotation
  confirm | keep              answer a pending deletion
  leave                       leave the session";

/// Parse one console line.  `Ok(None)` for blank lines.
pub fn parse_command(line: &str) -> Result<Option<ClientCommand>, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb {
        "" => return Ok(None),
        "select" => ClientCommand::SelectParticipant(
            ParticipantId::parse(rest).map_err(|e| e.to_string())?,
        ),
        "dismiss" => ClientCommand::DismissSelection,
        "drag" => ClientCommand::MapDragged,
        "locate" => ClientCommand::LocateMe,
        "follow" => ClientCommand::ToggleFollow,
        "clear-trail" => ClientCommand::ClearTrail,
        "pin" => ClientCommand::BeginPlacing,
        "cancel" => ClientCommand::CancelPlacing,
        "place" => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            let lat = parse_f64(parts.next(), "lat")?;
            let lng = parse_f64(parts.next(), "lng")?;
            let at = GeoPoint::checked(lat, lng).map_err(|e| e.to_string())?;
            ClientCommand::PlaceAnnotation {
                at,
                text: parts.next().unwrap_or("").trim().to_string(),
            }
        }
        "edit" => {
            let (id, text) = rest
                .split_once(char::is_whitespace)
                .unwrap_or((rest, ""));
            ClientCommand::EditAnnotation {
                id: parse_annotation_id(id)?,
                text: text.trim().to_string(),
            }
        }
        "delete" => ClientCommand::RequestDeleteAnnotation(parse_annotation_id(rest)?),
        "confirm" => ClientCommand::ConfirmDeleteAnnotation,
        "keep" => ClientCommand::CancelDeleteAnnotation,
        "leave" | "quit" | "exit" => ClientCommand::Leave,
        other => return Err(format!("unknown command {other:?}, try `help`")),
    };
    Ok(Some(command))
}

fn parse_f64(raw: Option<&str>, what: &str) -> Result<f64, String> {
    raw.and_then(|s| s.parse().ok())
        .ok_or_else(|| format!("expected a number for {what}"))
}

fn parse_annotation_id(raw: &str) -> Result<AnnotationId, String> {
    Uuid::parse_str(raw.trim())
        .map(AnnotationId)
        .map_err(|e| format!("bad annotation id: {e}"))
}

/// Forward stdin commands until EOF, which counts as leaving.
pub async fn read_commands(commands: mpsc::Sender<ClientCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim() == "help" {
            eprintln!("{HELP}");
            continue;
        }
        match parse_command(&line) {
            Ok(Some(command)) => {
                if commands.send(command).await.is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => eprintln!("{e}"),
        }
    }
    let _ = commands.send(ClientCommand::Leave).await;
}

/// Print every event as one JSON line until the client stops.
pub async fn print_events(mut events: mpsc::Receiver<ClientEvent>) {
    while let Some(event) = events.recv().await {
        match serde_json::to_string(&event) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!(error = %e, "unprintable event"),
        }
    }
}
