//! Protocol session lifecycle state.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one external tool server session.
///
/// ```text
/// Idle → Connecting → Negotiating → Ready ⇄ Invoking → Closing → Closed
///                    any state ──────────────→ Faulted ──(backoff)──→ Connecting
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Negotiating,
    Ready,
    Invoking,
    Closing,
    Closed,
    Faulted {
        reason: String,
        /// No further reconnect attempts will be made.
        permanent: bool,
    },
}

impl SessionState {
    pub fn faulted(reason: impl Into<String>) -> Self {
        Self::Faulted {
            reason: reason.into(),
            permanent: false,
        }
    }

    pub fn permanently_faulted(reason: impl Into<String>) -> Self {
        Self::Faulted {
            reason: reason.into(),
            permanent: true,
        }
    }

    /// Whether the session accepts invocations.
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Ready | Self::Invoking)
    }

    pub const fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted { .. })
    }

    /// No transition out of this state will ever happen.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Faulted {
                permanent: true,
                ..
            }
        )
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Negotiating => "negotiating",
            Self::Ready => "ready",
            Self::Invoking => "invoking",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Faulted { .. } => "faulted",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Faulted { reason, permanent } => {
                let kind = if *permanent { "faulted (permanent)" } else { "faulted" };
                write!(f, "{kind}: {reason}")
            }
            other => f.write_str(other.label()),
        }
    }
}

/// Per-server diagnostic snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub id: String,
    pub state: SessionState,
    pub tool_count: usize,
}
