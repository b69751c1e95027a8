//! Ordered message list for the single open thread.
//!
//! The store is exclusive: opening a thread discards all state of the
//! previous one and bumps an epoch counter.  Page fetches run outside the
//! store (between lock scopes), so every fetch is bracketed by a `begin_*`
//! that captures the epoch and an `apply_*` that re-validates it; a page
//! resolving after the active thread changed is discarded, not applied.

use chrono::{DateTime, Utc};
use tracing::debug;

use parley_shared::models::{Attachment, Message, Thread};
use parley_shared::types::{MessageId, ThreadId, UserId};

use crate::backend::MessageDraft;
use crate::error::{Result, StoreError};
use crate::events::{StoreEvent, StoreEvents};

/// Capture of the pagination state at the time an older-page fetch started.
#[derive(Debug, Clone, Copy)]
pub struct OlderPageRequest {
    pub thread: ThreadId,
    /// Fetch strictly older than this timestamp.
    pub before: DateTime<Utc>,
    epoch: u64,
}

#[derive(Debug, Clone)]
struct ActiveThread {
    thread: Thread,
    /// Creation-time ascending, ties broken by id ascending.
    messages: Vec<Message>,
    /// Oldest-loaded creation timestamp; `None` until the first page lands.
    cursor: Option<DateTime<Utc>>,
    /// Set once a page comes back empty; stops further loads.
    exhausted: bool,
}

pub struct MessageStore {
    user: Option<UserId>,
    active: Option<ActiveThread>,
    epoch: u64,
    events: StoreEvents,
}

impl MessageStore {
    pub fn new(events: StoreEvents) -> Self {
        Self {
            user: None,
            active: None,
            epoch: 0,
            events,
        }
    }

    pub fn bind_user(&mut self, user: UserId) {
        self.user = Some(user);
        self.active = None;
    }

    fn require_user(&self) -> Result<UserId> {
        self.user.ok_or(StoreError::NotAuthenticated)
    }

    /// Make `thread` the active thread, discarding the previous one.
    ///
    /// Returns the new epoch; the caller fetches the newest page and hands
    /// it back through [`MessageStore::apply_initial_page`].
    pub fn begin_open(&mut self, thread: Thread) -> Result<u64> {
        self.require_user()?;
        self.epoch += 1;
        let id = thread.id;
        self.active = Some(ActiveThread {
            thread,
            messages: Vec::new(),
            cursor: None,
            exhausted: false,
        });
        self.events.emit(StoreEvent::ThreadOpened(id));
        Ok(self.epoch)
    }

    /// Land the newest page for the open identified by `epoch`.
    ///
    /// Returns `None` when the page was stale (a newer open happened while
    /// the fetch was in flight) and nothing was applied; callers must not
    /// run their post-open side effects in that case.
    pub fn apply_initial_page(
        &mut self,
        epoch: u64,
        page_newest_first: Vec<Message>,
    ) -> Option<usize> {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "discarding stale initial page");
            return None;
        }
        let active = self.active.as_mut()?;

        let mut page: Vec<Message> = page_newest_first
            .into_iter()
            .filter(|m| m.thread_id == active.thread.id)
            .collect();
        if page.is_empty() {
            active.exhausted = true;
            return Some(0);
        }

        page.sort_by_key(Message::sort_key);
        page.dedup_by_key(|m| m.id);
        active.cursor = page.first().map(|m| m.created_at);
        let count = page.len();
        active.messages = page;
        Some(count)
    }

    /// Start a backward-pagination fetch.
    ///
    /// `None` when there is nothing to do: no open thread, no cursor yet,
    /// or the end of history was already reached — callers must treat that
    /// as a completed no-op, not retry.
    pub fn begin_older_page(&self) -> Option<OlderPageRequest> {
        let active = self.active.as_ref()?;
        if active.exhausted {
            return None;
        }
        Some(OlderPageRequest {
            thread: active.thread.id,
            before: active.cursor?,
            epoch: self.epoch,
        })
    }

    /// Prepend a fetched page of strictly-older messages.
    ///
    /// Returns how many messages were applied.  A request from a previous
    /// epoch is discarded (the active thread changed underneath it); an
    /// empty page marks the history exhausted.
    pub fn apply_older_page(
        &mut self,
        request: OlderPageRequest,
        page_newest_first: Vec<Message>,
    ) -> usize {
        if request.epoch != self.epoch {
            debug!(
                thread = %request.thread.short(),
                "discarding older page for a no-longer-active thread"
            );
            return 0;
        }
        let Some(active) = self.active.as_mut() else {
            return 0;
        };
        if active.thread.id != request.thread {
            return 0;
        }

        if page_newest_first.is_empty() {
            active.exhausted = true;
            return 0;
        }

        let mut fresh: Vec<Message> = page_newest_first
            .into_iter()
            .filter(|m| {
                m.thread_id == active.thread.id
                    && !active.messages.iter().any(|existing| existing.id == m.id)
            })
            .collect();
        fresh.sort_by_key(Message::sort_key);
        let count = fresh.len();
        if count == 0 {
            return 0;
        }

        active.cursor = fresh.first().map(|m| m.created_at);
        fresh.append(&mut active.messages);
        active.messages = fresh;
        self.events.emit(StoreEvent::OlderMessagesLoaded {
            thread: request.thread,
            count,
        });
        count
    }

    /// Append a message to the open thread, keeping order and deduplicating
    /// by id.  Duplicate delivery of the same insert event is a no-op.
    pub fn append(&mut self, msg: Message) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        if active.thread.id != msg.thread_id {
            return false;
        }
        if active.messages.iter().any(|m| m.id == msg.id) {
            debug!(id = %msg.id, "duplicate message insert, skipping");
            return false;
        }

        let key = msg.sort_key();
        let pos = active
            .messages
            .partition_point(|m| m.sort_key() <= key);
        active.messages.insert(pos, msg.clone());
        self.events.emit(StoreEvent::MessageAppended(msg));
        true
    }

    /// Patch a message in place (read-flag flip).  No-op when the message
    /// is not loaded.
    pub fn patch(&mut self, msg: Message) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        match active.messages.iter_mut().find(|m| m.id == msg.id) {
            Some(slot) => {
                *slot = msg.clone();
                self.events.emit(StoreEvent::MessagePatched(msg));
                true
            }
            None => false,
        }
    }

    /// Flip the read flag on every loaded message addressed to the bound
    /// user.  Returns the ids that changed.  Only ever called from the
    /// receiver's side of the thread.
    pub fn mark_incoming_read(&mut self) -> Result<Vec<MessageId>> {
        let user = self.require_user()?;
        let Some(active) = self.active.as_mut() else {
            return Ok(Vec::new());
        };

        let mut flipped = Vec::new();
        for m in active.messages.iter_mut() {
            if m.receiver_id == user && !m.read {
                m.read = true;
                flipped.push(m.id);
            }
        }
        if !flipped.is_empty() {
            self.events.emit(StoreEvent::MessagesMarkedRead {
                thread: active.thread.id,
                ids: flipped.clone(),
            });
        }
        Ok(flipped)
    }

    /// Validate a send against the open thread and derive the receiver.
    ///
    /// A message must carry a non-empty body, an attachment, or both.
    pub fn validate_send(
        &self,
        body: Option<&str>,
        attachment: Option<Attachment>,
    ) -> Result<MessageDraft> {
        let user = self.require_user()?;
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| StoreError::InvalidInput("no open thread".into()))?;

        let body = body
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string);
        if body.is_none() && attachment.is_none() {
            return Err(StoreError::InvalidInput(
                "message needs a body or an attachment".into(),
            ));
        }

        let receiver = active
            .thread
            .other_participant(user)
            .ok_or_else(|| StoreError::InvalidInput("user is not a participant".into()))?;

        Ok(MessageDraft {
            thread_id: active.thread.id,
            sender_id: user,
            receiver_id: receiver,
            body,
            attachment,
        })
    }

    pub fn active_thread(&self) -> Option<&Thread> {
        self.active.as_ref().map(|a| &a.thread)
    }

    pub fn messages(&self) -> &[Message] {
        self.active.as_ref().map(|a| a.messages.as_slice()).unwrap_or(&[])
    }

    /// Drop all state (logout).
    pub fn clear(&mut self) {
        self.user = None;
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fixture() -> (MessageStore, Thread, UserId, UserId) {
        let me = UserId::new();
        let peer = UserId::new();
        let thread = Thread {
            id: ThreadId::new(),
            user_a: me,
            user_b: peer,
            created_at: Utc::now(),
        };
        let mut store = MessageStore::new(StoreEvents::new());
        store.bind_user(me);
        (store, thread, me, peer)
    }

    fn msg(thread: &Thread, sender: UserId, id: i64, at: DateTime<Utc>) -> Message {
        Message {
            id: MessageId(id),
            thread_id: thread.id,
            sender_id: sender,
            receiver_id: thread.other_participant(sender).unwrap(),
            body: Some(format!("m{id}")),
            attachment: None,
            read: false,
            created_at: at,
        }
    }

    #[test]
    fn load_older_without_open_thread_is_a_noop() {
        let (store, _, _, _) = fixture();
        assert!(store.begin_older_page().is_none());
    }

    #[test]
    fn load_older_without_cursor_is_a_noop() {
        let (mut store, thread, _, _) = fixture();
        store.begin_open(thread).unwrap();
        // No page applied yet, so there is no cursor.
        assert!(store.begin_older_page().is_none());
    }

    #[test]
    fn empty_page_marks_history_exhausted() {
        let (mut store, thread, me, _) = fixture();
        let now = Utc::now();
        let epoch = store.begin_open(thread.clone()).unwrap();
        store.apply_initial_page(epoch, vec![msg(&thread, me, 1, now)]);

        let request = store.begin_older_page().unwrap();
        assert_eq!(store.apply_older_page(request, vec![]), 0);
        // Exhausted: no further requests are produced, so no loop.
        assert!(store.begin_older_page().is_none());
    }

    #[test]
    fn older_pages_prepend_and_advance_cursor() {
        let (mut store, thread, me, peer) = fixture();
        let now = Utc::now();
        let epoch = store.begin_open(thread.clone()).unwrap();
        store.apply_initial_page(
            epoch,
            vec![msg(&thread, me, 4, now), msg(&thread, peer, 3, now - Duration::minutes(1))],
        );

        let request = store.begin_older_page().unwrap();
        assert_eq!(request.before, now - Duration::minutes(1));

        let applied = store.apply_older_page(
            request,
            vec![
                msg(&thread, peer, 2, now - Duration::minutes(2)),
                msg(&thread, me, 1, now - Duration::minutes(3)),
            ],
        );
        assert_eq!(applied, 2);

        let ids: Vec<i64> = store.messages().iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        let request = store.begin_older_page().unwrap();
        assert_eq!(request.before, now - Duration::minutes(3));
    }

    #[test]
    fn stale_older_page_is_discarded_after_reopen() {
        let (mut store, thread, me, _) = fixture();
        let other_thread = Thread {
            id: ThreadId::new(),
            user_a: thread.user_a,
            user_b: UserId::new(),
            created_at: Utc::now(),
        };
        let now = Utc::now();

        let epoch = store.begin_open(thread.clone()).unwrap();
        store.apply_initial_page(epoch, vec![msg(&thread, me, 5, now)]);
        let stale = store.begin_older_page().unwrap();

        // The user switches threads while the fetch is in flight.
        let epoch = store.begin_open(other_thread.clone()).unwrap();
        store.apply_initial_page(epoch, vec![msg(&other_thread, me, 9, now)]);

        let applied =
            store.apply_older_page(stale, vec![msg(&thread, me, 4, now - Duration::minutes(1))]);
        assert_eq!(applied, 0);
        let ids: Vec<i64> = store.messages().iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![9]);
    }

    #[test]
    fn append_dedups_by_id() {
        let (mut store, thread, _, peer) = fixture();
        let now = Utc::now();
        let epoch = store.begin_open(thread.clone()).unwrap();
        store.apply_initial_page(epoch, vec![msg(&thread, peer, 1, now)]);

        let m = msg(&thread, peer, 2, now + Duration::seconds(1));
        assert!(store.append(m.clone()));
        assert!(!store.append(m));
        assert_eq!(store.messages().len(), 2);
    }

    #[test]
    fn equal_timestamps_break_ties_by_id() {
        let (mut store, thread, me, peer) = fixture();
        let now = Utc::now();
        store.begin_open(thread.clone()).unwrap();

        store.append(msg(&thread, peer, 12, now));
        store.append(msg(&thread, me, 11, now));

        let ids: Vec<i64> = store.messages().iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![11, 12]);
    }

    #[test]
    fn patch_misses_are_noops() {
        let (mut store, thread, _, peer) = fixture();
        let now = Utc::now();
        store.begin_open(thread.clone()).unwrap();

        let mut unknown = msg(&thread, peer, 42, now);
        unknown.read = true;
        assert!(!store.patch(unknown));
    }

    #[test]
    fn mark_incoming_read_only_touches_my_messages() {
        let (mut store, thread, me, peer) = fixture();
        let now = Utc::now();
        let epoch = store.begin_open(thread.clone()).unwrap();
        store.apply_initial_page(
            epoch,
            vec![
                msg(&thread, peer, 2, now),
                msg(&thread, me, 1, now - Duration::seconds(5)),
            ],
        );

        let flipped = store.mark_incoming_read().unwrap();
        assert_eq!(flipped, vec![MessageId(2)]);
        // The message I sent stays untouched; its receiver flips it.
        assert!(!store.messages().iter().find(|m| m.id.0 == 1).unwrap().read);
        assert!(store.messages().iter().find(|m| m.id.0 == 2).unwrap().read);
    }

    #[test]
    fn send_requires_body_or_attachment() {
        let (mut store, thread, _, _) = fixture();
        store.begin_open(thread).unwrap();

        assert!(matches!(
            store.validate_send(None, None),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            store.validate_send(Some("   "), None),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn send_requires_an_open_thread() {
        let (store, _, _, _) = fixture();
        assert!(matches!(
            store.validate_send(Some("hi"), None),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn send_derives_the_receiver() {
        let (mut store, thread, me, peer) = fixture();
        store.begin_open(thread.clone()).unwrap();

        let draft = store.validate_send(Some(" hello "), None).unwrap();
        assert_eq!(draft.sender_id, me);
        assert_eq!(draft.receiver_id, peer);
        assert_eq!(draft.body.as_deref(), Some("hello"));
        assert_eq!(draft.thread_id, thread.id);
    }
}
