//! Transport seam: remote objects, parcels and death notification.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

/// Identity of a remote object, stable for its lifetime.
pub type ObjectId = Uuid;

/// Shared handle to a remote object.
pub type RemoteHandle = Arc<dyn RemoteObject>;

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Remote object is dead: {0}")]
    DeadObject(ObjectId),
    #[error("Interface mismatch: expected {expected}, found {found}")]
    InterfaceMismatch { expected: String, found: String },
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("Parcel is missing a remote object")]
    MissingObject,
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}

/// Unit of data sent to or returned from a remote object.
///
/// The payload is a JSON-encoded protocol message; remote handles travel
/// out of band in `objects`, the way a binder parcel carries object refs.
#[derive(Clone, Default)]
pub struct Parcel {
    /// Interface token the payload is addressed to.
    pub interface: String,
    /// Encoded message.
    pub payload: Bytes,
    /// Attached remote handles.
    pub objects: Vec<RemoteHandle>,
}

impl Parcel {
    /// Encode `msg` for `interface`.
    ///
    /// # Errors
    /// Returns error if the message cannot be serialized.
    pub fn encode<T: Serialize>(interface: &str, msg: &T) -> Result<Self, TransportError> {
        Ok(Self {
            interface: interface.to_string(),
            payload: Bytes::from(serde_json::to_vec(msg)?),
            objects: Vec::new(),
        })
    }

    /// Attach a remote handle.
    #[must_use]
    pub fn with_object(mut self, object: RemoteHandle) -> Self {
        self.objects.push(object);
        self
    }

    /// Decode the payload, checking the interface token first.
    ///
    /// # Errors
    /// Returns error on token mismatch or malformed payload.
    pub fn decode<T: DeserializeOwned>(&self, interface: &str) -> Result<T, TransportError> {
        if self.interface != interface {
            return Err(TransportError::InterfaceMismatch {
                expected: interface.to_string(),
                found: self.interface.clone(),
            });
        }
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Take the first attached remote handle.
    ///
    /// # Errors
    /// Returns error if no handle is attached.
    pub fn read_object(&mut self) -> Result<RemoteHandle, TransportError> {
        if self.objects.is_empty() {
            return Err(TransportError::MissingObject);
        }
        Ok(self.objects.remove(0))
    }
}

impl std::fmt::Debug for Parcel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parcel")
            .field("interface", &self.interface)
            .field("payload_len", &self.payload.len())
            .field("objects", &self.objects.iter().map(|o| o.id()).collect::<Vec<_>>())
            .finish()
    }
}

/// Callback fired when a remote object becomes unreachable.
pub trait DeathRecipient: Send + Sync {
    fn on_remote_died(&self, object: ObjectId);
}

/// Client-side view of a remote object.
///
/// Calls block the calling task until a reply or a transport failure;
/// the transport may deliver death notices from any thread, possibly more
/// than once.
#[async_trait]
pub trait RemoteObject: Send + Sync {
    /// Object identity.
    fn id(&self) -> ObjectId;

    /// Send a request and wait for the reply.
    async fn send_request(&self, data: Parcel) -> Result<Parcel, TransportError>;

    /// Register for death notification. Returns false if already dead.
    fn add_death_recipient(&self, recipient: Arc<dyn DeathRecipient>) -> bool;

    /// Remove a previously registered recipient.
    fn remove_death_recipient(&self, recipient: &Arc<dyn DeathRecipient>) -> bool;

    /// Whether the object is believed reachable.
    fn is_alive(&self) -> bool {
        true
    }
}

/// Server-side receiver for one interface.
#[async_trait]
pub trait RemoteStub: Send + Sync {
    /// Interface token this stub serves.
    fn interface(&self) -> &'static str;

    /// Handle one inbound request.
    async fn on_remote_request(&self, data: Parcel) -> Result<Parcel, TransportError>;
}

/// Turns a local stub into a handle that can be passed to a peer.
pub trait StubBinder: Send + Sync {
    fn bind(&self, stub: Arc<dyn RemoteStub>) -> RemoteHandle;
}

/// Whether two recipients are the same allocation.
#[must_use]
pub fn same_recipient(a: &Arc<dyn DeathRecipient>, b: &Arc<dyn DeathRecipient>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
