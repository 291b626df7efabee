use serde::{Deserialize, Serialize};

use crate::world::entity::{EntityId, Position};
use crate::world::notify::{ChatTarget, EntitySnapshot, Notification};

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// New position and heading of the sender's entity
    Move(Position),
    /// Chat text; `target` of None (or 0) means world chat
    Chat { target: Option<EntityId>, text: String },
    /// Ask for one batch snapshot of everything in view
    RequestSurroundings,
}

impl ClientMessage {
    /// Resolve the wire chat target to a routing target
    pub fn chat_target(target: Option<EntityId>) -> ChatTarget {
        match target {
            Some(id) if id > 0 => ChatTarget::Entity(id),
            _ => ChatTarget::World,
        }
    }
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// The connection is bound to this entity
    IdentityAssigned { id: EntityId },
    /// Fresh position of an entity in view (including the receiver itself)
    PositionSnapshot { id: EntityId, position: Position },
    /// An entity came into view
    EnteredView { id: EntityId, position: Position },
    /// An entity left view
    LeftView { id: EntityId },
    /// Everything currently in view
    BatchSnapshot { entities: Vec<EntitySnapshot> },
    /// Chat text
    Chat { from: EntityId, world: bool, text: String },
}

impl From<Notification> for ServerMessage {
    fn from(notification: Notification) -> Self {
        match notification {
            Notification::IdentityAssigned { id } => Self::IdentityAssigned { id },
            Notification::PositionSnapshot { id, position } => Self::PositionSnapshot { id, position },
            Notification::EntityEnteredView { id, position } => Self::EnteredView { id, position },
            Notification::EntityLeftView { id } => Self::LeftView { id },
            Notification::BatchSnapshot { entities } => Self::BatchSnapshot { entities },
            Notification::Chat { from, target, text } => Self::Chat {
                from,
                world: target == ChatTarget::World,
                text,
            },
        }
    }
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy()).map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_move() {
        let msg = ClientMessage::Move(Position::new(160.5, 2.0, 134.25, 270.0));
        let encoded = encode(&msg).unwrap();
        let decoded: ClientMessage = decode(&encoded).unwrap();
        match decoded {
            ClientMessage::Move(p) => {
                assert_eq!(p.x, 160.5);
                assert_eq!(p.z, 134.25);
                assert_eq!(p.heading, 270.0);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_client_chat() {
        let msg = ClientMessage::Chat {
            target: Some(3),
            text: "hello".to_string(),
        };
        let decoded: ClientMessage = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_chat_target_resolution() {
        assert_eq!(ClientMessage::chat_target(None), ChatTarget::World);
        assert_eq!(ClientMessage::chat_target(Some(0)), ChatTarget::World);
        assert_eq!(ClientMessage::chat_target(Some(9)), ChatTarget::Entity(9));
    }

    #[test]
    fn test_notification_mapping() {
        let msg: ServerMessage = Notification::Chat {
            from: 1,
            target: ChatTarget::Entity(2),
            text: "dm".to_string(),
        }
        .into();
        assert_eq!(
            msg,
            ServerMessage::Chat {
                from: 1,
                world: false,
                text: "dm".to_string()
            }
        );

        let msg: ServerMessage = Notification::EntityLeftView { id: 4 }.into();
        assert_eq!(msg, ServerMessage::LeftView { id: 4 });
    }

    #[test]
    fn test_batch_snapshot_encoding() {
        let msg = ServerMessage::BatchSnapshot {
            entities: vec![
                EntitySnapshot { id: 1, position: Position::new(1.0, 0.0, 2.0, 0.0) },
                EntitySnapshot { id: 2, position: Position::new(3.0, 0.0, 4.0, 90.0) },
            ],
        };
        let decoded: ServerMessage = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_decode_garbage() {
        let result: Result<ClientMessage, _> = decode(&[0xff, 0xff, 0xff, 0xff, 0x01]);
        assert!(result.is_err());
    }
}
