//! Sequenced wire envelope around a job event.

use relay_core::events::JobEvent;
use relay_core::ids::{JobId, SessionId};
use serde::{Deserialize, Serialize};

/// One published event with its per-job sequence number.
///
/// Sequence numbers start at 1 and increase by 1 per published event, so
/// any subscriber can detect gaps and resume with `after_seq`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEnvelope {
    /// Per-job monotonic sequence number (1-based).
    pub seq: u64,
    /// The job this event belongs to.
    pub job_id: JobId,
    /// The session the job runs in.
    pub session_id: SessionId,
    /// Publication timestamp (RFC 3339).
    pub timestamp: String,
    /// The event payload (tagged with `type` on the wire).
    #[serde(flatten)]
    pub event: JobEvent,
}
