//! Outbound notifications
//!
//! The core never encodes bytes. It hands abstract [`Notification`]s to an
//! [`Outbound`] capability attached to every entity; the network layer decides
//! how to put them on the wire.
//!
//! Fan-out is two-phase: transitions first collect an ordered [`Fanout`] while
//! holding only short snapshot locks, then the batch is delivered with no lock
//! held. Deliveries inside one batch keep their order, so a peer always sees a
//! mover's leave, enter and refresh notifications in that sequence.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::world::entity::{Entity, EntityId, Position};

/// One entity's id and position, as carried by batch snapshots
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub position: Position,
}

/// Where a chat message goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatTarget {
    /// Every online entity
    World,
    /// A single entity
    Entity(EntityId),
}

/// Abstract payloads the core asks the protocol layer to deliver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    /// The receiving connection has been bound to this entity id
    IdentityAssigned { id: EntityId },
    /// Fresh coordinates of an entity that is (still) in view
    PositionSnapshot { id: EntityId, position: Position },
    /// An entity became visible
    EntityEnteredView { id: EntityId, position: Position },
    /// An entity is no longer visible
    EntityLeftView { id: EntityId },
    /// Every other entity currently in view
    BatchSnapshot { entities: Vec<EntitySnapshot> },
    /// Chat text from another entity
    Chat { from: EntityId, target: ChatTarget, text: String },
}

/// Errors from handing a notification to an outbound channel
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("Outbound channel closed")]
    Closed,
}

/// Capability to send notifications to one connected peer
///
/// Implementations must not block: they are called from transition fan-out
/// loops that serve many recipients in sequence.
pub trait Outbound: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), SendError>;
}

/// Outbound backed by an unbounded tokio channel drained by the connection's writer task
#[derive(Debug, Clone)]
pub struct ChannelOutbound {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelOutbound {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Outbound for ChannelOutbound {
    fn send(&self, notification: Notification) -> Result<(), SendError> {
        self.tx.send(notification).map_err(|_| SendError::Closed)
    }
}

// ============================================================================
// Fanout
// ============================================================================

/// Ordered batch of (recipient, notification) pairs produced by one operation
#[derive(Default)]
pub struct Fanout {
    deliveries: Vec<(Arc<Entity>, Notification)>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            deliveries: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn push(&mut self, recipient: &Arc<Entity>, notification: Notification) {
        self.deliveries.push((recipient.clone(), notification));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    /// (recipient id, notification) pairs in delivery order
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Notification)> {
        self.deliveries.iter().map(|(entity, n)| (entity.id, n))
    }

    /// Send everything immediately, in order. Returns how many sends succeeded.
    pub fn dispatch(self) -> usize {
        self.deliveries
            .into_iter()
            .map(|(recipient, notification)| recipient.send(notification))
            .filter(|sent| *sent)
            .count()
    }

    /// Send everything in order, sleeping `pacing` between individual sends
    ///
    /// With no pacing this is equivalent to [`Fanout::dispatch`].
    pub async fn deliver(self, pacing: Option<Duration>) -> usize {
        let pacing = match pacing {
            Some(p) if !p.is_zero() => p,
            _ => return self.dispatch(),
        };

        let mut sent = 0;
        let mut first = true;
        for (recipient, notification) in self.deliveries {
            if !first {
                tokio::time::sleep(pacing).await;
            }
            first = false;
            if recipient.send(notification) {
                sent += 1;
            }
        }
        sent
    }
}
