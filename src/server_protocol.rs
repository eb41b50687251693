use serde_json::Value;

use crate::types::PlayMode;

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    Hello {
        session_key: Option<String>,
        mode: Option<PlayMode>,
        world_id: Option<String>,
    },
    /// World-relative target of a tap or click.
    Pointer {
        x: f64,
        y: f64,
    },
    Focus {
        active: bool,
    },
    Ping {
        t: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let session_key = match object.get("sessionKey") {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.as_str()?.to_string()),
            };
            let mode = match object.get("mode") {
                None => None,
                Some(value) => PlayMode::parse(value.as_str()?),
            };
            if object.get("mode").is_some() && mode.is_none() {
                return None;
            }
            let world_id = match object.get("worldId") {
                None => None,
                Some(value) => Some(value.as_str()?.to_string()),
            };
            Some(ParsedClientMessage::Hello {
                session_key,
                mode,
                world_id,
            })
        }
        "pointer" => {
            let x = parse_finite(object.get("x"))?;
            let y = parse_finite(object.get("y"))?;
            Some(ParsedClientMessage::Pointer { x, y })
        }
        "focus" => {
            let active = object.get("active")?.as_bool()?;
            Some(ParsedClientMessage::Focus { active })
        }
        "ping" => {
            let t = parse_finite(object.get("t"))?;
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

fn parse_finite(value: Option<&Value>) -> Option<f64> {
    value?.as_f64().filter(|number| number.is_finite())
}
