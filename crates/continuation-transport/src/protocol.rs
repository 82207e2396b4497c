//! Wire protocol for the continuation peer channels.
//!
//! Each interface has its own request enum; remote handles are never part
//! of the JSON payload and ride in [`Parcel::objects`](crate::Parcel).

use continuation_core::StateBag;
use serde::{Deserialize, Serialize};

use crate::remote::{Parcel, TransportError};

/// Interface token of the primary-callable channel.
pub const PRIMARY_INTERFACE: &str = "ability.continuation.ReverseSchedulerPrimary";

/// Interface token of the replica-callable channel.
pub const REPLICA_INTERFACE: &str = "ability.continuation.ReverseSchedulerReplica";

/// Interface token of the ability-scheduler channel used by the directory service.
pub const SCHEDULER_INTERFACE: &str = "ability.continuation.AbilityScheduler";

/// Request to the device currently acting as primary. Sent by the replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrimaryRequest {
    /// The replica ability is going away.
    NotifyReplicaTerminated,
    /// Hand control back, carrying the replica's state.
    ContinuationBack { state: StateBag },
}

/// Request to the device currently acting as replica. Sent by the primary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplicaRequest {
    /// Primary's callback handle, attached as the first parcel object.
    PassPrimary,
    /// Ask the replica to begin reversal from its side.
    ReverseContinuation,
    /// Outcome of the primary's restore after a `ContinuationBack`.
    NotifyReverseResult { result: i32 },
}

/// Inbound calls from the directory service into the ability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerRequest {
    /// Start migrating to `device_id`.
    ContinueAbility { device_id: String },
    /// Final outcome of a migration.
    NotifyContinuationResult { result: i32 },
    /// Replica's reverse-scheduler handle, attached as the first parcel object.
    ReceiveReplicaScheduler,
}

/// Reply to any request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerReply {
    /// One-way request accepted.
    Ack,
    /// Boolean outcome of a two-way request.
    Accepted { ok: bool },
    /// The receiver could not service the request.
    Error { message: String },
}

impl PeerReply {
    /// Decode a reply parcel.
    ///
    /// # Errors
    /// Returns error if the parcel is not a reply for `interface`.
    pub fn from_parcel(parcel: &Parcel, interface: &str) -> Result<Self, TransportError> {
        parcel.decode(interface)
    }

    /// Encode this reply for `interface`.
    ///
    /// # Errors
    /// Returns error if the reply cannot be serialized.
    pub fn into_parcel(self, interface: &str) -> Result<Parcel, TransportError> {
        Parcel::encode(interface, &self)
    }

    /// Expect an acknowledgement.
    ///
    /// # Errors
    /// Returns error for remote failures or a mismatched reply kind.
    pub fn into_ack(self) -> Result<(), TransportError> {
        match self {
            Self::Ack => Ok(()),
            Self::Error { message } => Err(TransportError::Dispatch(message)),
            other @ Self::Accepted { .. } => Err(TransportError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// Expect a boolean outcome.
    ///
    /// # Errors
    /// Returns error for remote failures or a mismatched reply kind.
    pub fn into_bool(self) -> Result<bool, TransportError> {
        match self {
            Self::Accepted { ok } => Ok(ok),
            Self::Error { message } => Err(TransportError::Dispatch(message)),
            Self::Ack => Err(TransportError::UnexpectedReply("ack".to_string())),
        }
    }

    /// Map a handler result into a reply, keeping handler failures on the wire.
    #[must_use]
    pub fn from_result<T>(result: Result<T, TransportError>, f: impl FnOnce(T) -> Self) -> Self {
        match result {
            Ok(v) => f(v),
            Err(e) => Self::Error {
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_tags() {
        let json = serde_json::to_string(&ReplicaRequest::NotifyReverseResult { result: 3 }).unwrap();
        assert!(json.contains("notify_reverse_result"));

        let json = serde_json::to_string(&PrimaryRequest::NotifyReplicaTerminated).unwrap();
        assert_eq!(json, r#"{"type":"notify_replica_terminated"}"#);
    }

    #[test]
    fn test_reply_kinds() {
        assert!(PeerReply::Ack.into_ack().is_ok());
        assert!(PeerReply::Accepted { ok: false }.into_bool().is_ok_and(|ok| !ok));
        assert!(matches!(
            PeerReply::Ack.into_bool(),
            Err(TransportError::UnexpectedReply(_))
        ));
        assert!(matches!(
            PeerReply::Error {
                message: "gone".to_string()
            }
            .into_ack(),
            Err(TransportError::Dispatch(m)) if m == "gone"
        ));
    }

    #[test]
    fn test_continuation_back_carries_state() {
        let msg = PrimaryRequest::ContinuationBack {
            state: StateBag::new().with("k", "v"),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: PrimaryRequest = serde_json::from_str(&json).unwrap();
        if let PrimaryRequest::ContinuationBack { state } = parsed {
            assert_eq!(state.get_string("k"), Some("v"));
        } else {
            panic!("Wrong message type");
        }
    }
}
