use serde_json::Value;

use crate::engine::Action;

#[derive(Debug)]
pub enum ParsedClientMessage {
    Setup {
        participants: Vec<String>,
        timer_seconds: Option<i64>,
    },
    StartSession {
        seed: Option<i64>,
    },
    Action(Action),
    Reset,
    Ping {
        t: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "setup" => {
            let participants = match object.get("participants") {
                None => Vec::new(),
                Some(value) => value
                    .as_array()?
                    .iter()
                    .map(|entry| entry.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()?,
            };
            let timer_seconds = parse_optional_i64(object.get("timerSeconds"))?;
            Some(ParsedClientMessage::Setup {
                participants,
                timer_seconds,
            })
        }
        "start_session" => {
            let seed = parse_optional_i64(object.get("seed"))?;
            Some(ParsedClientMessage::StartSession { seed })
        }
        "start_turn" => Some(ParsedClientMessage::Action(Action::StartTurn)),
        "correct" => Some(ParsedClientMessage::Action(Action::Correct)),
        "skip" => Some(ParsedClientMessage::Action(Action::Skip)),
        "pause" => Some(ParsedClientMessage::Action(Action::Pause)),
        "resume" => Some(ParsedClientMessage::Action(Action::Resume)),
        "stop_turn" => Some(ParsedClientMessage::Action(Action::StopTurn)),
        "advance" => Some(ParsedClientMessage::Action(Action::Advance)),
        "reset" => Some(ParsedClientMessage::Reset),
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

fn parse_optional_i64(value: Option<&Value>) -> Option<Option<i64>> {
    const MAX_SAFE_INTEGER_F64: f64 = 9_007_199_254_740_991.0;

    let Some(value) = value else {
        return Some(None);
    };
    if let Some(number) = value.as_i64() {
        return Some(Some(number));
    }
    if let Some(number) = value.as_u64() {
        return i64::try_from(number).ok().map(Some);
    }
    if let Some(number) = value.as_f64() {
        if number.is_finite() {
            let floored = number.floor();
            if floored.abs() > MAX_SAFE_INTEGER_F64 {
                return None;
            }
            return Some(Some(floored as i64));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_setup_message() {
        let parsed = parse_client_message(
            r#"{"type":"setup","participants":["Ani","Budi"],"timerSeconds":120}"#,
        )
        .expect("setup message should parse");
        match parsed {
            ParsedClientMessage::Setup {
                participants,
                timer_seconds,
            } => {
                assert_eq!(participants, vec!["Ani", "Budi"]);
                assert_eq!(timer_seconds, Some(120));
            }
            _ => panic!("expected setup message"),
        }
    }

    #[test]
    fn parse_setup_rejects_non_string_participants() {
        assert!(parse_client_message(r#"{"type":"setup","participants":["Ani",3]}"#).is_none());
        assert!(parse_client_message(r#"{"type":"setup","participants":"Ani"}"#).is_none());
    }

    #[test]
    fn parse_setup_floors_float_timer() {
        let parsed = parse_client_message(r#"{"type":"setup","timerSeconds":90.7}"#);
        assert!(matches!(
            parsed,
            Some(ParsedClientMessage::Setup {
                timer_seconds: Some(90),
                ..
            })
        ));
    }

    #[test]
    fn parse_game_actions() {
        for (raw, expected) in [
            ("start_turn", Action::StartTurn),
            ("correct", Action::Correct),
            ("skip", Action::Skip),
            ("pause", Action::Pause),
            ("resume", Action::Resume),
            ("stop_turn", Action::StopTurn),
            ("advance", Action::Advance),
        ] {
            let parsed = parse_client_message(&format!(r#"{{"type":"{raw}"}}"#));
            match parsed {
                Some(ParsedClientMessage::Action(action)) => assert_eq!(action, expected),
                other => panic!("expected action for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_rejects_unknown_or_invalid() {
        assert!(parse_client_message("not json").is_none());
        assert!(parse_client_message(r#"{"type":"teleport"}"#).is_none());
        assert!(parse_client_message(r#"{"kind":"correct"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"start_session","seed":1e100}"#).is_none());
    }

    #[test]
    fn parse_ping_requires_number() {
        let parsed = parse_client_message(r#"{"type":"ping","t":12.5}"#);
        assert!(matches!(parsed, Some(ParsedClientMessage::Ping { .. })));
        assert!(parse_client_message(r#"{"type":"ping","t":"x"}"#).is_none());
    }
}
