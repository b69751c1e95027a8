//! Per-call signaling state machine.
//!
//! Pure state: transitions validate preconditions and hand decisions back
//! to the coordinator, which performs the actual media and transport work.
//! A session is single-shot; once `Ended` it is discarded and a new call
//! starts a fresh instance.

use tracing::debug;

use parley_shared::types::UserId;

use crate::error::CallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    /// Caller side: offer sent, waiting for the answer.
    Offering,
    /// Callee side: offer received, waiting for the user to accept.
    Ringing,
    /// Descriptions exchanged, ICE negotiation under way.
    Connecting,
    Connected,
    /// Terminal.  A new call never reuses this session.
    Ended,
}

/// An offer surfaced to the UI before any media is acquired.  Media is
/// touched only on explicit accept.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingCall {
    pub from: UserId,
    pub sdp: String,
    pub video: bool,
}

pub struct CallSession {
    local_user: UserId,
    remote_user: Option<UserId>,
    state: CallState,
    video: bool,
    incoming: Option<IncomingCall>,
    remote_description_set: bool,
    /// Candidates that arrived before the remote description; flushed the
    /// moment it is applied.  Dropping these breaks connectivity.
    pending_candidates: Vec<String>,
}

impl CallSession {
    pub fn new(local_user: UserId) -> Self {
        Self {
            local_user,
            remote_user: None,
            state: CallState::Idle,
            video: false,
            incoming: None,
            remote_description_set: false,
            pending_candidates: Vec::new(),
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn local_user(&self) -> UserId {
        self.local_user
    }

    pub fn remote_user(&self) -> Option<UserId> {
        self.remote_user
    }

    pub fn incoming(&self) -> Option<&IncomingCall> {
        self.incoming.as_ref()
    }

    pub fn is_video(&self) -> bool {
        self.video
    }

    pub fn is_terminal(&self) -> bool {
        self.state == CallState::Ended
    }

    fn expect_state(&self, expected: CallState, name: &'static str) -> Result<(), CallError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CallError::InvalidState {
                expected: name,
                actual: self.state,
            })
        }
    }

    /// Caller: media acquired, about to create the offer.  Idle → Offering.
    pub fn begin_offer(&mut self, target: UserId, video: bool) -> Result<(), CallError> {
        self.expect_state(CallState::Idle, "Idle")?;
        self.remote_user = Some(target);
        self.video = video;
        self.state = CallState::Offering;
        debug!(remote = %target.short(), video, "outgoing call started");
        Ok(())
    }

    /// Callee: an offer arrived.  Idle → Ringing; no media is acquired.
    pub fn receive_offer(
        &mut self,
        from: UserId,
        sdp: String,
        video: bool,
    ) -> Result<&IncomingCall, CallError> {
        self.expect_state(CallState::Idle, "Idle")?;
        self.remote_user = Some(from);
        self.video = video;
        self.incoming = Some(IncomingCall { from, sdp, video });
        self.state = CallState::Ringing;
        debug!(remote = %from.short(), video, "incoming call ringing");
        Ok(self.incoming.as_ref().expect("just set"))
    }

    /// Callee: the user accepted.  Valid only while Ringing; returns the
    /// stored offer so the coordinator can apply it as remote description.
    pub fn begin_accept(&mut self) -> Result<IncomingCall, CallError> {
        self.expect_state(CallState::Ringing, "Ringing")?;
        Ok(self.incoming.clone().expect("ringing implies an offer"))
    }

    /// Callee: answer transmitted.  Ringing → Connecting.
    pub fn answer_sent(&mut self) -> Result<(), CallError> {
        self.expect_state(CallState::Ringing, "Ringing")?;
        self.state = CallState::Connecting;
        Ok(())
    }

    /// Caller: the answer arrived.  Offering → Connecting; returns the SDP
    /// to apply as remote description.
    pub fn remote_answer(&mut self, sdp: String) -> Result<String, CallError> {
        self.expect_state(CallState::Offering, "Offering")?;
        self.state = CallState::Connecting;
        Ok(sdp)
    }

    /// The remote description has been applied to the peer connection.
    /// Returns every candidate that was queued while it was missing.
    pub fn mark_remote_description(&mut self) -> Vec<String> {
        self.remote_description_set = true;
        let flushed = std::mem::take(&mut self.pending_candidates);
        if !flushed.is_empty() {
            debug!(count = flushed.len(), "flushing queued ICE candidates");
        }
        flushed
    }

    /// Route one remote candidate: `Some` means apply now, `None` means it
    /// was queued until the remote description lands.
    pub fn accept_candidate(&mut self, candidate: String) -> Option<String> {
        if self.remote_description_set {
            Some(candidate)
        } else {
            debug!("queueing ICE candidate before remote description");
            self.pending_candidates.push(candidate);
            None
        }
    }

    /// ICE negotiation succeeded.  Connecting → Connected.
    pub fn connected(&mut self) -> Result<(), CallError> {
        self.expect_state(CallState::Connecting, "Connecting")?;
        self.state = CallState::Connected;
        Ok(())
    }

    /// Media acquisition failed before anything was negotiated; the attempt
    /// is abandoned and the session returns to Idle.
    pub fn fail_media(&mut self) {
        self.remote_user = None;
        self.incoming = None;
        self.video = false;
        self.remote_description_set = false;
        self.pending_candidates.clear();
        self.state = CallState::Idle;
    }

    /// Terminal transition, valid from every state.
    pub fn end(&mut self) {
        self.incoming = None;
        self.pending_candidates.clear();
        self.state = CallState::Ended;
    }
}
