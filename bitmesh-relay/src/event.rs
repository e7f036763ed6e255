//! The relay event model and the JSON wire frames around it.
//!
//! Events are identified by the SHA-256 of the canonical array
//! `[0, pubkey, created_at, kind, tags, content]` and carry a BIP-340
//! signature over that id. Frames are JSON arrays tagged `EVENT`, `REQ`,
//! `CLOSE` outbound and `EVENT`, `EOSE`, `OK`, `NOTICE` inbound.

use crate::error::{RelayError, RelayResult};
use crate::keys::RelayKeys;
use crate::schnorr;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl RelayEvent {
    /// The canonical id digest of an event's fields.
    pub fn compute_id(
        pubkey: &str,
        created_at: u64,
        kind: u32,
        tags: &[Vec<String>],
        content: &str,
    ) -> [u8; 32] {
        let canonical = json!([0, pubkey, created_at, kind, tags, content]);
        let serialized = canonical.to_string();
        Sha256::digest(serialized.as_bytes()).into()
    }

    /// Builds and signs a fresh event.
    pub fn sign_new(
        keys: &RelayKeys,
        created_at: u64,
        kind: u32,
        tags: Vec<Vec<String>>,
        content: String,
    ) -> RelayResult<Self> {
        let pubkey = keys.public_hex();
        let id = Self::compute_id(&pubkey, created_at, kind, &tags, &content);
        let sig = keys.sign(&id)?;
        Ok(Self {
            id: hex::encode(id),
            pubkey,
            created_at,
            kind,
            tags,
            content,
            sig: hex::encode(sig),
        })
    }

    /// Checks the id digest and the signature.
    pub fn verify(&self) -> RelayResult<()> {
        let expected =
            Self::compute_id(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content);
        if hex::encode(expected) != self.id {
            return Err(RelayError::SignatureInvalid);
        }
        let public_x: [u8; 32] = decode_fixed(&self.pubkey)?;
        let sig: [u8; 64] = decode_fixed(&self.sig)?;
        if !schnorr::verify(&expected, &sig, &public_x) {
            return Err(RelayError::SignatureInvalid);
        }
        Ok(())
    }

    /// Geohash scopes carried in `["g", <geohash>]` tags.
    pub fn geohash_scopes(&self) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|tag| tag.len() >= 2 && tag[0] == "g")
            .map(|tag| tag[1].as_str())
            .collect()
    }
}

fn decode_fixed<const N: usize>(hex_str: &str) -> RelayResult<[u8; N]> {
    let bytes = hex::decode(hex_str).map_err(|_| RelayError::InvalidKey)?;
    bytes.try_into().map_err(|_| RelayError::InvalidKey)
}

/// A subscription filter. Only the fields this client uses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(rename = "#g", skip_serializing_if = "Option::is_none")]
    pub geohashes: Option<Vec<String>>,
}

/// A stored subscription: filter plus an optional explicit relay target set
/// (`None` targets every relay).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub filter: Filter,
    pub relays: Option<Vec<String>>,
}

impl Subscription {
    pub fn targets(&self, relay_url: &str) -> bool {
        match &self.relays {
            None => true,
            Some(urls) => urls.iter().any(|url| url == relay_url),
        }
    }
}

/// Outbound frames.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Event(RelayEvent),
    Req { sub_id: String, filter: Filter },
    Close { sub_id: String },
}

impl ClientMessage {
    pub fn to_json(&self) -> String {
        match self {
            ClientMessage::Event(event) => json!(["EVENT", event]).to_string(),
            ClientMessage::Req { sub_id, filter } => {
                json!(["REQ", sub_id, filter]).to_string()
            }
            ClientMessage::Close { sub_id } => json!(["CLOSE", sub_id]).to_string(),
        }
    }
}

/// Inbound frames.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event {
        sub_id: String,
        event: Box<RelayEvent>,
    },
    Eose {
        sub_id: String,
    },
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Notice {
        message: String,
    },
}

impl RelayMessage {
    pub fn parse(text: &str) -> RelayResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|error| RelayError::Protocol(error.to_string()))?;
        let array = value
            .as_array()
            .ok_or_else(|| RelayError::Protocol("frame is not an array".into()))?;
        let tag = array
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::Protocol("missing frame tag".into()))?;

        match tag {
            "EVENT" => {
                let sub_id = str_at(array, 1)?;
                let event: RelayEvent = serde_json::from_value(
                    array
                        .get(2)
                        .cloned()
                        .ok_or_else(|| RelayError::Protocol("missing event".into()))?,
                )
                .map_err(|error| RelayError::Protocol(error.to_string()))?;
                Ok(RelayMessage::Event {
                    sub_id,
                    event: Box::new(event),
                })
            }
            "EOSE" => Ok(RelayMessage::Eose {
                sub_id: str_at(array, 1)?,
            }),
            "OK" => Ok(RelayMessage::Ok {
                event_id: str_at(array, 1)?,
                accepted: array.get(2).and_then(Value::as_bool).unwrap_or(false),
                message: array
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
            }),
            "NOTICE" => Ok(RelayMessage::Notice {
                message: str_at(array, 1)?,
            }),
            other => Err(RelayError::Protocol(format!("unknown frame tag {other}"))),
        }
    }
}

fn str_at(array: &[Value], index: usize) -> RelayResult<String> {
    array
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| RelayError::Protocol(format!("missing string at {index}")))
}
