//! Orchestration over the stores and the data backend.
//!
//! Every store mutation happens in a short lock scope; backend requests run
//! between them, never under a lock.  The stores' epoch and dedup rules are
//! what make that interleaving safe: a fetch that resolves after the world
//! changed is discarded when it is handed back.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::info;

use parley_shared::constants::MESSAGE_PAGE_SIZE;
use parley_shared::models::{Attachment, Message, Thread};
use parley_shared::types::{ThreadId, UserId};
use parley_store::{
    DataBackend, MessageStore, StoreError, StoreEvent, StoreEvents, ThreadStore, ThreadSummary,
};
use parley_sync::{Notifier, RealtimeIngest};

use crate::error::{ClientError, Result};

pub struct Messenger<B> {
    backend: Arc<B>,
    user: UserId,
    events: StoreEvents,
    threads: Arc<Mutex<ThreadStore>>,
    messages: Arc<Mutex<MessageStore>>,
}

impl<B: DataBackend> Messenger<B> {
    pub fn new(backend: Arc<B>, user: UserId) -> Self {
        let events = StoreEvents::new();
        let mut thread_store = ThreadStore::new(events.clone());
        thread_store.bind_user(user);
        let mut message_store = MessageStore::new(events.clone());
        message_store.bind_user(user);

        Self {
            backend,
            user,
            events,
            threads: Arc::new(Mutex::new(thread_store)),
            messages: Arc::new(Mutex::new(message_store)),
        }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    /// Observe store changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Build the ingest component wired to this messenger's stores.  The
    /// caller spawns its `run` loop on the change-feed subscription.
    pub fn ingest(&self, notifier: Option<Arc<dyn Notifier>>) -> RealtimeIngest {
        RealtimeIngest::new(self.user, self.threads.clone(), self.messages.clone(), notifier)
    }

    fn threads_mut(&self) -> Result<MutexGuard<'_, ThreadStore>> {
        self.threads.lock().map_err(|_| ClientError::LockPoisoned)
    }

    fn messages_mut(&self) -> Result<MutexGuard<'_, MessageStore>> {
        self.messages.lock().map_err(|_| ClientError::LockPoisoned)
    }

    /// Fetch the thread list and rebuild the sidebar summaries.
    pub async fn refresh_threads(&self) -> Result<Vec<ThreadSummary>> {
        let listed = self.backend.list_threads(self.user).await?;

        let other_ids: Vec<UserId> = listed
            .iter()
            .filter_map(|t| t.other_participant(self.user))
            .collect();
        let profiles = self.backend.fetch_profiles(&other_ids).await?;

        let mut digests = Vec::with_capacity(listed.len());
        for thread in &listed {
            let last = self
                .backend
                .fetch_messages(thread.id, None, 1)
                .await?
                .into_iter()
                .next();
            let unread = self.backend.unread_count(thread.id, self.user).await?;
            digests.push((last, unread));
        }

        let mut threads = self.threads_mut()?;
        threads.set_threads(listed.clone())?;
        for (thread, (last, unread)) in listed.iter().zip(digests) {
            let profile = thread
                .other_participant(self.user)
                .and_then(|other| profiles.iter().find(|p| p.id == other));
            threads.seed_summary(thread.id, profile, last, unread)?;
        }
        Ok(threads.summaries())
    }

    /// Idempotent thread creation for the unordered pair (me, `other`).
    ///
    /// Two clients racing this for the same pair both end up with the same
    /// thread id: the loser's insert hits the unique constraint and falls
    /// back to re-querying the winner's row.
    pub async fn create_or_get_thread(&self, other: UserId) -> Result<Thread> {
        if other == self.user {
            return Err(ClientError::InvalidInput(
                "cannot open a thread with yourself".into(),
            ));
        }

        if let Some(existing) = self.threads_mut()?.find_between(self.user, other).cloned() {
            return Ok(existing);
        }

        let thread = match self.backend.find_thread(self.user, other).await? {
            Some(existing) => existing,
            None => match self.backend.insert_thread(self.user, other).await {
                Ok(created) => {
                    info!(thread = %created.id.short(), "thread created");
                    created
                }
                Err(StoreError::Conflict) => self
                    .backend
                    .find_thread(self.user, other)
                    .await?
                    .ok_or(StoreError::NotFound)?,
                Err(e) => return Err(e.into()),
            },
        };

        self.threads_mut()?.insert_if_absent(thread.clone())?;

        let profiles = self.backend.fetch_profiles(&[other]).await?;
        if let Some(profile) = profiles.first() {
            self.threads_mut()?.set_profile(thread.id, profile);
        }
        Ok(thread)
    }

    /// Open a thread: fetch the newest page, flip unread messages addressed
    /// to this user to read, and zero the sidebar counter.
    pub async fn open_thread(&self, thread_id: ThreadId) -> Result<Vec<Message>> {
        let thread = self
            .threads_mut()?
            .thread(thread_id)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        let epoch = self.messages_mut()?.begin_open(thread)?;

        let page = self
            .backend
            .fetch_messages(thread_id, None, MESSAGE_PAGE_SIZE)
            .await?;
        self.backend.mark_read(thread_id, self.user).await?;

        let snapshot = {
            let mut messages = self.messages_mut()?;
            match messages.apply_initial_page(epoch, page) {
                // Another open superseded this one while the fetch was out.
                None => None,
                Some(_) => {
                    messages.mark_incoming_read()?;
                    Some(messages.messages().to_vec())
                }
            }
        };
        let Some(snapshot) = snapshot else {
            return Ok(Vec::new());
        };

        self.threads_mut()?.reset_unread(thread_id);
        Ok(snapshot)
    }

    /// Fetch the next page of history, strictly older than what is loaded.
    ///
    /// Returns the newly prepended messages, oldest first; empty when there
    /// is no open thread, no cursor, or no more history.
    pub async fn load_older(&self) -> Result<Vec<Message>> {
        let Some(request) = self.messages_mut()?.begin_older_page() else {
            return Ok(Vec::new());
        };

        let page = self
            .backend
            .fetch_messages(request.thread, Some(request.before), MESSAGE_PAGE_SIZE)
            .await?;

        let mut messages = self.messages_mut()?;
        let applied = messages.apply_older_page(request, page);
        Ok(messages.messages()[..applied].to_vec())
    }

    /// Send into the open thread.  The returned message has already been
    /// folded into the sidebar summary as the new last message.
    pub async fn send(
        &self,
        body: Option<&str>,
        attachment: Option<Attachment>,
    ) -> Result<Message> {
        let draft = self.messages_mut()?.validate_send(body, attachment)?;
        let message = self.backend.insert_message(draft).await?;

        self.messages_mut()?.append(message.clone());
        self.threads_mut()?.record_message(&message)?;

        info!(id = %message.id, thread = %message.thread_id.short(), "message sent");
        Ok(message)
    }

    /// Current sidebar snapshot.
    pub fn summaries(&self) -> Result<Vec<ThreadSummary>> {
        Ok(self.threads_mut()?.summaries())
    }

    /// Messages of the open thread, oldest first.
    pub fn messages_snapshot(&self) -> Result<Vec<Message>> {
        Ok(self.messages_mut()?.messages().to_vec())
    }

    pub fn active_thread(&self) -> Result<Option<Thread>> {
        Ok(self.messages_mut()?.active_thread().cloned())
    }
}
