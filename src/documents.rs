use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::types::BehaviorKind;

pub type Fields = Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BunnyDoc {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub sad: bool,
    pub owner: Option<String>,
    pub name: String,
    pub behavior: BehaviorKind,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ObstacleDoc {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ItemDoc {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub message: String,
}

/// The shared world document: the unit of synchronization.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct WorldDoc {
    pub bunnies: Vec<BunnyDoc>,
    pub trees: Vec<ObstacleDoc>,
    pub bushes: Vec<ObstacleDoc>,
    pub items: Vec<ItemDoc>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PlayerDoc {
    pub id: String,
    /// Absent or zero coordinates keep the locally rolled spawn.
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub username: String,
    pub hugs: u32,
    pub progress: i64,
    #[serde(rename = "timePlayed")]
    pub time_played: u64,
    pub online: bool,
    #[serde(rename = "lastActive")]
    pub last_active: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TopPlayer {
    pub username: String,
    #[serde(rename = "timePlayed")]
    pub time_played: u64,
}

impl WorldDoc {
    /// Lenient decode: missing arrays are empty and entries without an id or
    /// of the wrong shape are skipped.
    pub fn from_fields(fields: &Fields) -> Self {
        Self {
            bunnies: decode_entries(fields, "bunnies", decode_bunny),
            trees: decode_entries(fields, "trees", decode_obstacle),
            bushes: decode_entries(fields, "bushes", decode_obstacle),
            items: decode_entries(fields, "items", decode_item),
            last_updated: u64_of(fields, "lastUpdated").unwrap_or(0),
        }
    }

    pub fn to_fields(&self) -> Fields {
        to_object(self)
    }

    pub fn is_unpopulated(&self) -> bool {
        self.bunnies.is_empty()
    }
}

impl PlayerDoc {
    pub fn from_fields(id: &str, fields: &Fields) -> Self {
        Self {
            id: str_of(fields, "id").unwrap_or_else(|| id.to_string()),
            x: f64_of(fields, "x").filter(|value| *value != 0.0),
            y: f64_of(fields, "y").filter(|value| *value != 0.0),
            username: str_of(fields, "username").unwrap_or_default(),
            hugs: u64_of(fields, "hugs").unwrap_or(0).min(u32::MAX as u64) as u32,
            progress: f64_of(fields, "progress").unwrap_or(0.0) as i64,
            time_played: u64_of(fields, "timePlayed").unwrap_or(0),
            online: fields.get("online").and_then(Value::as_bool).unwrap_or(false),
            last_active: u64_of(fields, "lastActive").unwrap_or(0),
        }
    }

    pub fn to_fields(&self) -> Fields {
        to_object(self)
    }
}

impl TopPlayer {
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("topPlayer".to_string(), Value::Object(to_object(self)));
        fields
    }
}

fn to_object<T: Serialize>(value: &T) -> Fields {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => Fields::new(),
        Err(error) => {
            warn!(error = %error, "document_encode_failed");
            Fields::new()
        }
    }
}

fn decode_entries<T>(fields: &Fields, key: &str, decode: fn(&Fields) -> Option<T>) -> Vec<T> {
    let Some(values) = fields.get(key).and_then(Value::as_array) else {
        if fields.contains_key(key) {
            warn!(field = key, "document_field_not_an_array");
        }
        return Vec::new();
    };
    values
        .iter()
        .filter_map(|value| {
            let decoded = value.as_object().and_then(decode);
            if decoded.is_none() {
                debug!(field = key, "document_entry_skipped");
            }
            decoded
        })
        .collect()
}

fn decode_bunny(fields: &Fields) -> Option<BunnyDoc> {
    let id = str_of(fields, "id").filter(|id| !id.is_empty())?;
    let owner = str_of(fields, "owner");
    Some(BunnyDoc {
        x: f64_of(fields, "x").unwrap_or(0.0),
        y: f64_of(fields, "y").unwrap_or(0.0),
        sad: fields
            .get("sad")
            .and_then(Value::as_bool)
            .unwrap_or(owner.is_none()),
        owner,
        name: str_of(fields, "name").unwrap_or_default(),
        behavior: str_of(fields, "behavior")
            .and_then(|value| BehaviorKind::parse(&value))
            .unwrap_or_default(),
        id,
    })
}

fn decode_obstacle(fields: &Fields) -> Option<ObstacleDoc> {
    let id = str_of(fields, "id").filter(|id| !id.is_empty())?;
    Some(ObstacleDoc {
        id,
        x: f64_of(fields, "x").unwrap_or(0.0),
        y: f64_of(fields, "y").unwrap_or(0.0),
    })
}

fn decode_item(fields: &Fields) -> Option<ItemDoc> {
    let id = str_of(fields, "id").filter(|id| !id.is_empty())?;
    Some(ItemDoc {
        id,
        x: f64_of(fields, "x").unwrap_or(0.0),
        y: f64_of(fields, "y").unwrap_or(0.0),
        message: str_of(fields, "message").unwrap_or_default(),
    })
}

fn str_of(fields: &Fields, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

fn f64_of(fields: &Fields, key: &str) -> Option<f64> {
    fields
        .get(key)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
}

fn u64_of(fields: &Fields, key: &str) -> Option<u64> {
    let value = fields.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Fields {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn world_doc_skips_entries_without_id() {
        let fields = object(json!({
            "bunnies": [
                { "id": "bunny-1", "x": 10, "y": -4.5, "sad": true, "owner": null, "name": "Lost One", "behavior": "flee" },
                { "x": 1, "y": 1 },
                "garbage"
            ],
            "trees": [{ "id": "tree-1", "x": 5, "y": 6 }],
            "items": [{ "id": "item-1", "x": 0, "y": 0, "message": "They see you." }],
            "lastUpdated": 1234
        }));

        let doc = WorldDoc::from_fields(&fields);
        assert_eq!(doc.bunnies.len(), 1);
        assert_eq!(doc.bunnies[0].behavior, BehaviorKind::Flee);
        assert_eq!(doc.bunnies[0].y, -4.5);
        assert_eq!(doc.trees.len(), 1);
        assert!(doc.bushes.is_empty());
        assert_eq!(doc.items[0].message, "They see you.");
        assert_eq!(doc.last_updated, 1234);
    }

    #[test]
    fn bunny_defaults_apply_per_field() {
        let fields = object(json!({
            "bunnies": [{ "id": "bunny-7", "behavior": "moonwalk", "owner": "p9" }]
        }));
        let doc = WorldDoc::from_fields(&fields);
        let bunny = &doc.bunnies[0];
        assert_eq!(bunny.x, 0.0);
        assert_eq!(bunny.behavior, BehaviorKind::Still);
        assert_eq!(bunny.owner.as_deref(), Some("p9"));
        assert!(!bunny.sad);
        assert_eq!(bunny.name, "");
    }

    #[test]
    fn player_doc_missing_fields_default_to_zero() {
        let fields = object(json!({ "username": "Subject_abcde", "x": 0, "y": 120.0, "hugs": "many" }));
        let doc = PlayerDoc::from_fields("abcde12345", &fields);
        assert_eq!(doc.id, "abcde12345");
        assert_eq!(doc.x, None);
        assert_eq!(doc.y, Some(120.0));
        assert_eq!(doc.hugs, 0);
        assert_eq!(doc.progress, 0);
        assert_eq!(doc.time_played, 0);
        assert!(!doc.online);
    }

    #[test]
    fn world_doc_round_trips_through_fields() {
        let doc = WorldDoc {
            bunnies: vec![BunnyDoc {
                id: "bunny-1".to_string(),
                x: 1.0,
                y: 2.0,
                sad: false,
                owner: Some("p1".to_string()),
                name: "Echo Bunny".to_string(),
                behavior: BehaviorKind::Wander,
            }],
            trees: Vec::new(),
            bushes: vec![ObstacleDoc {
                id: "bush-2".to_string(),
                x: 3.0,
                y: 4.0,
            }],
            items: Vec::new(),
            last_updated: 99,
        };
        let fields = doc.to_fields();
        assert_eq!(fields["lastUpdated"], json!(99));
        assert_eq!(WorldDoc::from_fields(&fields), doc);
    }

    #[test]
    fn top_player_is_nested_under_its_field() {
        let fields = TopPlayer {
            username: "Subject_x".to_string(),
            time_played: 5_000,
        }
        .to_fields();
        assert_eq!(fields["topPlayer"]["timePlayed"], json!(5_000));
    }
}
