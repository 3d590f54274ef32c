//! Attendance sessions and the check-in/check-out classifier.
//!
//! A person is either *out* (no open session) or *in* (exactly one open
//! session). Direction is never taken from the device's status code; it is
//! derived from whether a session is open and on which server-local day it
//! was opened.

use chrono::{DateTime, NaiveTime, Utc};

use crate::{PersonRef, Timebase};

/// How a session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMethod {
    /// Punch at a terminal.
    Biometric,
    /// Kiosk or app self-service.
    SelfService,
    /// Closed because the person checked in on a later day.
    AutoClose,
    /// Closed by the end-of-day sweep.
    AutoCheckout,
}

impl CheckoutMethod {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Biometric => "biometric",
            Self::SelfService => "self_service",
            Self::AutoClose => "auto_close",
            Self::AutoCheckout => "auto_checkout",
        }
    }

    /// Parse the storage representation.
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "biometric" => Some(Self::Biometric),
            "self_service" => Some(Self::SelfService),
            "auto_close" => Some(Self::AutoClose),
            "auto_checkout" => Some(Self::AutoCheckout),
            _ => None,
        }
    }
}

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Still open.
    CheckedIn,
    /// Closed.
    CheckedOut,
}

impl SessionStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckedIn => "checked_in",
            Self::CheckedOut => "checked_out",
        }
    }

    /// Parse the storage representation.
    pub fn from_db(value: &str) -> Self {
        match value {
            "checked_out" => Self::CheckedOut,
            _ => Self::CheckedIn,
        }
    }
}

/// One continuous presence interval.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AttendanceSession {
    /// Storage identifier.
    pub id: i64,
    /// Owning tenant.
    pub tenant_id: i64,
    /// Whose session.
    pub person: PersonRef,
    /// Check-in instant.
    pub checkin_time: DateTime<Utc>,
    /// Check-out instant, `None` while open.
    pub checkout_time: Option<DateTime<Utc>>,
    /// How the session was closed.
    pub checkout_method: Option<CheckoutMethod>,
    /// Open or closed.
    pub status: SessionStatus,
}

impl AttendanceSession {
    /// Whether the session is still open.
    pub fn is_open(&self) -> bool {
        self.checkout_time.is_none()
    }

    /// Whole minutes between check-in and check-out.
    pub fn duration_minutes(&self) -> Option<i64> {
        self.checkout_time
            .map(|out| out.signed_duration_since(self.checkin_time).num_minutes())
    }
}

/// Instruction to close a specific open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClose {
    /// Session to close.
    pub session_id: i64,
    /// Check-out instant.
    pub checkout_time: DateTime<Utc>,
    /// How it is being closed.
    pub method: CheckoutMethod,
}

/// Outcome of classifying a punch against the person's open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Open a new session, closing a stale one from an earlier day first.
    CheckIn {
        /// Stale session to auto-close.
        close_stale: Option<SessionClose>,
    },
    /// Close the open session.
    CheckOut(SessionClose),
    /// The punch is older than the open session's check-in.
    OutOfOrder {
        /// The open session.
        session_id: i64,
    },
}

/// Decide what a punch at `at` does given the person's open session.
pub fn classify(open: Option<&AttendanceSession>, at: DateTime<Utc>, tb: &Timebase) -> Transition {
    let Some(open) = open else {
        return Transition::CheckIn { close_stale: None };
    };

    if at < open.checkin_time {
        return Transition::OutOfOrder {
            session_id: open.id,
        };
    }

    if tb.local_date(open.checkin_time) != tb.local_date(at) {
        return Transition::CheckIn {
            close_stale: Some(SessionClose {
                session_id: open.id,
                checkout_time: at - chrono::Duration::seconds(1),
                method: CheckoutMethod::AutoClose,
            }),
        };
    }

    Transition::CheckOut(SessionClose {
        session_id: open.id,
        checkout_time: at,
        method: CheckoutMethod::Biometric,
    })
}

/// Check-out instant for the end-of-day sweep, if `session` is due at `now`.
///
/// A session is due once the server-local clock has passed `cutoff` on the
/// session's check-in day. It is closed at that cutoff, or at its own check-in
/// if it was opened after the cutoff.
pub fn sweep_checkout_time(
    session: &AttendanceSession,
    now: DateTime<Utc>,
    cutoff: NaiveTime,
    tb: &Timebase,
) -> Option<DateTime<Utc>> {
    if !session.is_open() {
        return None;
    }

    let cutoff_local = tb.local(session.checkin_time).date().and_time(cutoff);
    if tb.local(now) < cutoff_local {
        return None;
    }

    Some(tb.local_to_utc(cutoff_local).max(session.checkin_time))
}

/// What happened to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    /// A session was opened.
    Checkin,
    /// A session was closed.
    Checkout,
}

/// Session change delivered to the notification boundary.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionEvent {
    /// Whose session changed.
    pub person: PersonRef,
    /// Owning tenant.
    pub tenant_id: i64,
    /// Open or close.
    pub kind: SessionEventKind,
    /// Check-in instant.
    pub checkin_time: DateTime<Utc>,
    /// Check-out instant, for check-outs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_time: Option<DateTime<Utc>>,
    /// How the session was closed, for check-outs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_method: Option<CheckoutMethod>,
    /// Session length, for check-outs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
}

impl SessionEvent {
    /// Event for a freshly opened or freshly closed session.
    pub fn from_session(session: &AttendanceSession) -> Self {
        let kind = if session.is_open() {
            SessionEventKind::Checkin
        } else {
            SessionEventKind::Checkout
        };

        Self {
            person: session.person,
            tenant_id: session.tenant_id,
            kind,
            checkin_time: session.checkin_time,
            checkout_time: session.checkout_time,
            checkout_method: session.checkout_method,
            duration_minutes: session.duration_minutes(),
        }
    }
}
