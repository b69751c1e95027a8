//! Drives one call attempt end to end.
//!
//! The coordinator owns the session state machine plus the live media and
//! peer-connection handles, and sequences every transition: offers go out
//! only after media is acquired, the remote description is applied before
//! local tracks when answering, and queued candidates flush the moment the
//! description lands.  Failures are fail-closed: a signaling error tears
//! the whole attempt down rather than leaving a half-connected peer.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use parley_shared::constants::SIGNALING_TIMEOUT_SECS;
use parley_shared::protocol::{SignalMessage, SignalPayload};
use parley_shared::types::UserId;

use crate::error::CallError;
use crate::media::{MediaEngine, MediaStream, PeerConnection, SignalingTransport};
use crate::signaling::{CallSession, CallState, IncomingCall};

const EVENT_BUFFER: usize = 32;

#[derive(Debug, Clone)]
pub enum CallEvent {
    /// An offer arrived while idle; media has not been touched.
    Incoming(IncomingCall),
    StateChanged(CallState),
    RemoteStreamAttached,
}

pub struct CallCoordinator<E, T> {
    engine: E,
    transport: T,
    local_user: UserId,
    session: CallSession,
    peer: Option<Box<dyn PeerConnection>>,
    local_stream: Option<Box<dyn MediaStream>>,
    remote_stream: Option<Box<dyn MediaStream>>,
    events: broadcast::Sender<CallEvent>,
}

impl<E: MediaEngine, T: SignalingTransport> CallCoordinator<E, T> {
    pub fn new(local_user: UserId, engine: E, transport: T) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_BUFFER);
        Self {
            engine,
            transport,
            local_user,
            session: CallSession::new(local_user),
            peer: None,
            local_stream: None,
            remote_stream: None,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> CallState {
        self.session.state()
    }

    pub fn incoming(&self) -> Option<&IncomingCall> {
        self.session.incoming()
    }

    pub fn local_stream(&self) -> Option<&dyn MediaStream> {
        self.local_stream.as_deref()
    }

    pub fn remote_stream(&self) -> Option<&dyn MediaStream> {
        self.remote_stream.as_deref()
    }

    /// Place an outgoing call.  Idle → Offering.
    ///
    /// Media failure leaves the session Idle; any later failure ends the
    /// attempt.
    pub async fn start_call(&mut self, target: UserId, video: bool) -> Result<(), CallError> {
        if self.session.state() != CallState::Idle {
            return Err(CallError::InvalidState {
                expected: "Idle",
                actual: self.session.state(),
            });
        }

        let stream = self.engine.acquire(video).await?;
        self.session.begin_offer(target, video)?;
        self.local_stream = Some(stream);

        match self.engine.create_peer().await {
            Ok(peer) => self.peer = Some(peer),
            Err(e) => return Err(self.fail_attempt(e)),
        }

        let attached = {
            let stream = self.local_stream.as_deref().expect("stream acquired above");
            let peer = self.peer.as_mut().expect("peer created above");
            peer.attach_tracks(stream).await
        };
        if let Err(e) = attached {
            return Err(self.fail_attempt(e));
        }

        let offer = match self
            .peer
            .as_mut()
            .expect("peer created above")
            .create_offer()
            .await
        {
            Ok(sdp) => sdp,
            Err(e) => return Err(self.fail_attempt(e)),
        };
        if let Err(e) = self
            .peer
            .as_mut()
            .expect("peer created above")
            .set_local_description(&offer)
            .await
        {
            return Err(self.fail_attempt(e));
        }

        if let Err(e) = self.send_signal(SignalPayload::Offer { sdp: offer, video }).await {
            return Err(self.fail_attempt(e));
        }

        info!(remote = %target.short(), video, "offer sent");
        self.emit(CallEvent::StateChanged(CallState::Offering));
        Ok(())
    }

    /// Accept the ringing call.  Ringing → Connecting.
    ///
    /// Valid only while an offer is ringing; no media is acquired when the
    /// precondition fails.
    pub async fn accept_call(&mut self) -> Result<(), CallError> {
        let incoming = self.session.begin_accept()?;

        let stream = match self.engine.acquire(incoming.video).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "media acquisition failed, abandoning call");
                self.session.fail_media();
                self.emit(CallEvent::StateChanged(CallState::Idle));
                return Err(e);
            }
        };
        self.local_stream = Some(stream);

        match self.engine.create_peer().await {
            Ok(peer) => self.peer = Some(peer),
            Err(e) => return Err(self.fail_attempt(e)),
        }

        // Remote description first; applying it after the local tracks
        // breaks ICE negotiation.
        if let Err(e) = self
            .peer
            .as_mut()
            .expect("peer created above")
            .set_remote_description(&incoming.sdp)
            .await
        {
            return Err(self.fail_attempt(e));
        }
        self.flush_candidates().await;

        let attached = {
            let stream = self.local_stream.as_deref().expect("stream acquired above");
            let peer = self.peer.as_mut().expect("peer created above");
            peer.attach_tracks(stream).await
        };
        if let Err(e) = attached {
            return Err(self.fail_attempt(e));
        }

        let answer = match self
            .peer
            .as_mut()
            .expect("peer created above")
            .create_answer()
            .await
        {
            Ok(sdp) => sdp,
            Err(e) => return Err(self.fail_attempt(e)),
        };
        if let Err(e) = self
            .peer
            .as_mut()
            .expect("peer created above")
            .set_local_description(&answer)
            .await
        {
            return Err(self.fail_attempt(e));
        }

        if let Err(e) = self.send_signal(SignalPayload::Answer { sdp: answer }).await {
            return Err(self.fail_attempt(e));
        }

        self.session.answer_sent()?;
        info!(remote = %incoming.from.short(), "answer sent");
        self.emit(CallEvent::StateChanged(CallState::Connecting));
        Ok(())
    }

    /// Feed one signaling message from the relay.
    pub async fn on_signal(&mut self, message: SignalMessage) -> Result<(), CallError> {
        if message.target != self.local_user {
            debug!("signal addressed to another user, ignoring");
            return Ok(());
        }

        match message.payload {
            SignalPayload::Offer { sdp, video } => {
                if self.session.state() != CallState::Idle {
                    warn!(from = %message.sender.short(), "offer while busy, ignoring");
                    return Ok(());
                }
                let incoming = self.session.receive_offer(message.sender, sdp, video)?.clone();
                self.emit(CallEvent::Incoming(incoming));
                self.emit(CallEvent::StateChanged(CallState::Ringing));
                Ok(())
            }
            SignalPayload::Answer { sdp } => {
                if Some(message.sender) != self.session.remote_user() {
                    warn!(from = %message.sender.short(), "answer from unexpected user, ignoring");
                    return Ok(());
                }
                let sdp = self.session.remote_answer(sdp)?;
                let applied = match self.peer.as_mut() {
                    Some(peer) => peer.set_remote_description(&sdp).await,
                    None => Err(CallError::Peer("no peer connection".into())),
                };
                if let Err(e) = applied {
                    return Err(self.fail_attempt(e));
                }
                self.flush_candidates().await;
                self.emit(CallEvent::StateChanged(CallState::Connecting));
                Ok(())
            }
            SignalPayload::IceCandidate { candidate } => {
                if Some(message.sender) != self.session.remote_user() {
                    return Ok(());
                }
                if let Some(candidate) = self.session.accept_candidate(candidate) {
                    let applied = match self.peer.as_mut() {
                        Some(peer) => peer.add_ice_candidate(&candidate).await,
                        None => Ok(()),
                    };
                    if let Err(e) = applied {
                        warn!(error = %e, "failed to apply ICE candidate");
                    }
                }
                Ok(())
            }
            SignalPayload::Hangup => {
                if Some(message.sender) != self.session.remote_user() {
                    return Ok(());
                }
                info!(from = %message.sender.short(), "remote hangup");
                self.cleanup();
                Ok(())
            }
        }
    }

    /// ICE negotiation succeeded (reported by the platform glue).
    pub fn notify_connected(&mut self) -> Result<(), CallError> {
        self.session.connected()?;
        self.emit(CallEvent::StateChanged(CallState::Connected));
        Ok(())
    }

    /// The remote media stream arrived from the peer connection.
    pub fn attach_remote_stream(&mut self, stream: Box<dyn MediaStream>) {
        self.remote_stream = Some(stream);
        self.emit(CallEvent::RemoteStreamAttached);
    }

    /// Hang up locally: stop all tracks, close the peer, tell the remote.
    pub async fn end_call(&mut self) {
        if matches!(self.session.state(), CallState::Idle | CallState::Ended) {
            return;
        }
        self.cleanup();
        // Best effort; the call is over regardless of whether this lands.
        if let Err(e) = self.send_signal(SignalPayload::Hangup).await {
            warn!(error = %e, "failed to send hangup");
        }
    }

    async fn flush_candidates(&mut self) {
        for candidate in self.session.mark_remote_description() {
            let applied = match self.peer.as_mut() {
                Some(peer) => peer.add_ice_candidate(&candidate).await,
                None => break,
            };
            if let Err(e) = applied {
                warn!(error = %e, "failed to apply queued ICE candidate");
            }
        }
    }

    async fn send_signal(&self, payload: SignalPayload) -> Result<(), CallError> {
        let target = self
            .session
            .remote_user()
            .ok_or_else(|| CallError::SignalingFailure("no remote party".into()))?;
        let message = SignalMessage {
            sender: self.local_user,
            target,
            payload,
        };
        match timeout(
            Duration::from_secs(SIGNALING_TIMEOUT_SECS),
            self.transport.send(message),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CallError::SignalingFailure("signaling send timed out".into())),
        }
    }

    fn fail_attempt(&mut self, error: CallError) -> CallError {
        warn!(error = %error, "call attempt failed, tearing down");
        self.cleanup();
        error
    }

    fn cleanup(&mut self) {
        if let Some(mut stream) = self.local_stream.take() {
            stream.stop();
        }
        if let Some(mut stream) = self.remote_stream.take() {
            stream.stop();
        }
        if let Some(mut peer) = self.peer.take() {
            peer.close();
        }
        self.session.end();
        self.emit(CallEvent::StateChanged(CallState::Ended));
    }

    fn emit(&self, event: CallEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    type Ops = Arc<Mutex<Vec<String>>>;

    fn record(ops: &Ops, op: &str) {
        ops.lock().unwrap().push(op.to_string());
    }

    struct FakeStream {
        video: bool,
        ops: Ops,
    }

    impl MediaStream for FakeStream {
        fn has_video(&self) -> bool {
            self.video
        }

        fn stop(&mut self) {
            record(&self.ops, "stream.stop");
        }
    }

    struct FakePeer {
        ops: Ops,
    }

    #[async_trait]
    impl PeerConnection for FakePeer {
        async fn create_offer(&mut self) -> Result<String, CallError> {
            record(&self.ops, "peer.create_offer");
            Ok("offer-sdp".to_string())
        }

        async fn create_answer(&mut self) -> Result<String, CallError> {
            record(&self.ops, "peer.create_answer");
            Ok("answer-sdp".to_string())
        }

        async fn set_local_description(&mut self, _sdp: &str) -> Result<(), CallError> {
            record(&self.ops, "peer.set_local_description");
            Ok(())
        }

        async fn set_remote_description(&mut self, _sdp: &str) -> Result<(), CallError> {
            record(&self.ops, "peer.set_remote_description");
            Ok(())
        }

        async fn add_ice_candidate(&mut self, candidate: &str) -> Result<(), CallError> {
            record(&self.ops, &format!("peer.add_ice:{candidate}"));
            Ok(())
        }

        async fn attach_tracks(&mut self, _stream: &dyn MediaStream) -> Result<(), CallError> {
            record(&self.ops, "peer.attach_tracks");
            Ok(())
        }

        fn close(&mut self) {
            record(&self.ops, "peer.close");
        }
    }

    struct FakeEngine {
        ops: Ops,
        fail_acquire: bool,
    }

    #[async_trait]
    impl MediaEngine for FakeEngine {
        async fn acquire(&self, video: bool) -> Result<Box<dyn MediaStream>, CallError> {
            if self.fail_acquire {
                return Err(CallError::MediaUnavailable("permission denied".into()));
            }
            record(&self.ops, "engine.acquire");
            Ok(Box::new(FakeStream {
                video,
                ops: self.ops.clone(),
            }))
        }

        async fn create_peer(&self) -> Result<Box<dyn PeerConnection>, CallError> {
            record(&self.ops, "engine.create_peer");
            Ok(Box::new(FakePeer {
                ops: self.ops.clone(),
            }))
        }
    }

    struct FakeTransport {
        sent: Arc<Mutex<Vec<SignalMessage>>>,
        fail: bool,
    }

    #[async_trait]
    impl SignalingTransport for FakeTransport {
        async fn send(&self, message: SignalMessage) -> Result<(), CallError> {
            if self.fail {
                return Err(CallError::SignalingFailure("relay disconnected".into()));
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn coordinator(
        fail_acquire: bool,
        fail_send: bool,
    ) -> (
        CallCoordinator<FakeEngine, FakeTransport>,
        Ops,
        Arc<Mutex<Vec<SignalMessage>>>,
        UserId,
    ) {
        let ops: Ops = Arc::new(Mutex::new(Vec::new()));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let me = UserId::new();
        let coordinator = CallCoordinator::new(
            me,
            FakeEngine {
                ops: ops.clone(),
                fail_acquire,
            },
            FakeTransport {
                sent: sent.clone(),
                fail: fail_send,
            },
        );
        (coordinator, ops, sent, me)
    }

    fn offer_from(caller: UserId, callee: UserId) -> SignalMessage {
        SignalMessage {
            sender: caller,
            target: callee,
            payload: SignalPayload::Offer {
                sdp: "offer-sdp".to_string(),
                video: false,
            },
        }
    }

    #[tokio::test]
    async fn start_call_sends_an_offer() {
        let (mut coordinator, _ops, sent, me) = coordinator(false, false);
        let target = UserId::new();

        coordinator.start_call(target, true).await.unwrap();
        assert_eq!(coordinator.state(), CallState::Offering);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sender, me);
        assert_eq!(sent[0].target, target);
        assert!(matches!(
            sent[0].payload,
            SignalPayload::Offer { video: true, .. }
        ));
    }

    #[tokio::test]
    async fn early_candidate_is_queued_then_flushed_on_answer() {
        let (mut coordinator, ops, _sent, me) = coordinator(false, false);
        let target = UserId::new();
        coordinator.start_call(target, false).await.unwrap();

        // Candidate races ahead of the answer: queued, not applied.
        coordinator
            .on_signal(SignalMessage {
                sender: target,
                target: me,
                payload: SignalPayload::IceCandidate {
                    candidate: "cand-1".to_string(),
                },
            })
            .await
            .unwrap();
        assert!(!ops.lock().unwrap().iter().any(|op| op.starts_with("peer.add_ice")));

        coordinator
            .on_signal(SignalMessage {
                sender: target,
                target: me,
                payload: SignalPayload::Answer {
                    sdp: "answer-sdp".to_string(),
                },
            })
            .await
            .unwrap();
        assert_eq!(coordinator.state(), CallState::Connecting);

        {
            let ops = ops.lock().unwrap();
            let remote = ops
                .iter()
                .position(|op| op == "peer.set_remote_description")
                .unwrap();
            let ice = ops.iter().position(|op| op == "peer.add_ice:cand-1").unwrap();
            assert!(remote < ice, "candidate must flush after the description");
        }

        coordinator.notify_connected().unwrap();
        assert_eq!(coordinator.state(), CallState::Connected);
    }

    #[tokio::test]
    async fn accept_from_idle_fails_without_touching_media() {
        let (mut coordinator, ops, _sent, _me) = coordinator(false, false);

        let err = coordinator.accept_call().await.unwrap_err();
        assert!(matches!(err, CallError::InvalidState { expected: "Ringing", .. }));
        assert!(ops.lock().unwrap().is_empty(), "no media was acquired");
    }

    #[tokio::test]
    async fn accept_applies_remote_description_before_tracks() {
        let (mut coordinator, ops, sent, me) = coordinator(false, false);
        let caller = UserId::new();

        coordinator.on_signal(offer_from(caller, me)).await.unwrap();
        assert_eq!(coordinator.state(), CallState::Ringing);
        assert!(ops.lock().unwrap().is_empty(), "ringing acquires nothing");

        coordinator.accept_call().await.unwrap();
        assert_eq!(coordinator.state(), CallState::Connecting);

        let ops = ops.lock().unwrap();
        let seen: Vec<&str> = ops.iter().map(String::as_str).collect();
        assert_eq!(
            seen,
            vec![
                "engine.acquire",
                "engine.create_peer",
                "peer.set_remote_description",
                "peer.attach_tracks",
                "peer.create_answer",
                "peer.set_local_description",
            ]
        );

        let sent = sent.lock().unwrap();
        assert!(matches!(sent[0].payload, SignalPayload::Answer { .. }));
        assert_eq!(sent[0].target, caller);
    }

    #[tokio::test]
    async fn media_failure_returns_to_idle() {
        let (mut coordinator, _ops, sent, me) = coordinator(true, false);
        let caller = UserId::new();

        coordinator.on_signal(offer_from(caller, me)).await.unwrap();
        let err = coordinator.accept_call().await.unwrap_err();

        assert!(matches!(err, CallError::MediaUnavailable(_)));
        assert_eq!(coordinator.state(), CallState::Idle);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_fatal_to_the_attempt() {
        let (mut coordinator, ops, _sent, _me) = coordinator(false, true);

        let err = coordinator.start_call(UserId::new(), false).await.unwrap_err();
        assert!(matches!(err, CallError::SignalingFailure(_)));
        assert_eq!(coordinator.state(), CallState::Ended);

        let ops = ops.lock().unwrap();
        assert!(ops.contains(&"stream.stop".to_string()));
        assert!(ops.contains(&"peer.close".to_string()));
    }

    #[tokio::test]
    async fn remote_hangup_tears_down_without_replying() {
        let (mut coordinator, ops, sent, me) = coordinator(false, false);
        let target = UserId::new();
        coordinator.start_call(target, false).await.unwrap();

        coordinator
            .on_signal(SignalMessage {
                sender: target,
                target: me,
                payload: SignalPayload::Hangup,
            })
            .await
            .unwrap();

        assert_eq!(coordinator.state(), CallState::Ended);
        let ops = ops.lock().unwrap();
        assert!(ops.contains(&"stream.stop".to_string()));
        assert!(ops.contains(&"peer.close".to_string()));
        // Only the original offer went out; no reciprocal hangup.
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn local_hangup_notifies_the_remote() {
        let (mut coordinator, _ops, sent, _me) = coordinator(false, false);
        let target = UserId::new();
        coordinator.start_call(target, false).await.unwrap();

        coordinator.end_call().await;
        assert_eq!(coordinator.state(), CallState::Ended);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[1].payload, SignalPayload::Hangup));
    }

    #[tokio::test]
    async fn offer_while_busy_is_ignored() {
        let (mut coordinator, _ops, _sent, me) = coordinator(false, false);
        coordinator.start_call(UserId::new(), false).await.unwrap();

        coordinator
            .on_signal(offer_from(UserId::new(), me))
            .await
            .unwrap();
        assert_eq!(coordinator.state(), CallState::Offering);
        assert!(coordinator.incoming().is_none());
    }
}
