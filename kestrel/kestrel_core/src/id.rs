//! Strongly-typed identifiers for the Kestrel runtime.
//!
//! Every identifier is a thin wrapper around a UUID with a phantom type
//! parameter, so an [`ActorId`] can never be confused with a [`WatchToken`]
//! even though both are UUIDs underneath.
//!
//! # Examples
//!
//! ```
//! use kestrel_core::id::{ActorId, WatchToken};
//! use std::str::FromStr;
//!
//! let actor = ActorId::new();
//! let token = WatchToken::new();
//! assert_ne!(actor.to_string(), token.to_string());
//!
//! let id_str = "550e8400-e29b-41d4-a716-446655440000";
//! let actor = ActorId::from_str(id_str).unwrap();
//! assert_eq!(actor.to_string(), id_str);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A type-safe identifier based on UUID.
///
/// The phantom parameter `T` keeps identifiers for different entity kinds
/// apart at compile time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Id<T> {
    uuid: Uuid,
    #[serde(skip)]
    _marker: std::marker::PhantomData<T>,
}

impl<T> Id<T> {
    /// Create a new random identifier.
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Create an identifier from a specific UUID.
    ///
    /// # Examples
    ///
    /// ```
    /// use kestrel_core::id::ActorId;
    /// use uuid::Uuid;
    ///
    /// let uuid = Uuid::new_v4();
    /// let id = ActorId::from_uuid(uuid);
    /// assert_eq!(id.uuid(), uuid);
    /// ```
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid,
            _marker: std::marker::PhantomData,
        }
    }

    /// Get the underlying UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Create a nil (all zeros) identifier.
    pub fn nil() -> Self {
        Self::from_uuid(Uuid::nil())
    }

    /// Check if this is a nil identifier.
    pub fn is_nil(&self) -> bool {
        self.uuid.is_nil()
    }

    /// Short form used in thread names and log lines.
    pub fn short(&self) -> String {
        let mut s = self.uuid.simple().to_string();
        s.truncate(8);
        s
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

impl<T> FromStr for Id<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_uuid(Uuid::parse_str(s)?))
    }
}

/// Marker type for actors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorMarker;
/// Stable identity of an actor. Remains valid after the actor terminates.
pub type ActorId = Id<ActorMarker>;

/// Marker type for watch subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchMarker;
/// Opaque token identifying one watch edge.
pub type WatchToken = Id<WatchMarker>;

/// Marker type for gen-server requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestMarker;
/// Identifier of a single gen-server call.
pub type RequestId = Id<RequestMarker>;
