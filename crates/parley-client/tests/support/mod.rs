//! In-memory stand-in for the persistence collaborator, with just enough
//! knobs to reproduce the races the stores must tolerate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use parley_shared::models::{Message, Profile, Thread};
use parley_shared::types::{MessageId, ThreadId, UserId};
use parley_store::{DataBackend, MessageDraft, StoreError};

#[derive(Default)]
struct State {
    threads: Vec<Thread>,
    messages: Vec<Message>,
    profiles: HashMap<UserId, Profile>,
    next_message_id: i64,
}

pub struct MemoryBackend {
    state: Mutex<State>,
    /// While positive, `find_thread` misses on purpose; lets a test force
    /// two creators down the insert path to collide on the unique pair.
    suppress_find: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                next_message_id: 1,
                ..State::default()
            }),
            suppress_find: AtomicUsize::new(0),
        })
    }

    pub fn suppress_next_finds(&self, count: usize) {
        self.suppress_find.store(count, Ordering::SeqCst);
    }

    pub fn put_profile(&self, user: UserId, name: &str) {
        self.state.lock().unwrap().profiles.insert(
            user,
            Profile {
                id: user,
                name: Some(name.to_string()),
                avatar: None,
            },
        );
    }

    pub fn seed_thread(&self, a: UserId, b: UserId) -> Thread {
        let thread = Thread {
            id: ThreadId::new(),
            user_a: a,
            user_b: b,
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().threads.push(thread.clone());
        thread
    }

    pub fn seed_message(
        &self,
        thread: &Thread,
        sender: UserId,
        body: &str,
        created_at: DateTime<Utc>,
    ) -> Message {
        let mut state = self.state.lock().unwrap();
        let id = state.next_message_id;
        state.next_message_id += 1;
        let message = Message {
            id: MessageId(id),
            thread_id: thread.id,
            sender_id: sender,
            receiver_id: thread.other_participant(sender).unwrap(),
            body: Some(body.to_string()),
            attachment: None,
            read: false,
            created_at,
        };
        state.messages.push(message.clone());
        message
    }

    pub fn thread_count(&self) -> usize {
        self.state.lock().unwrap().threads.len()
    }

    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }
}

#[async_trait]
impl DataBackend for MemoryBackend {
    async fn list_threads(&self, user: UserId) -> Result<Vec<Thread>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .threads
            .iter()
            .filter(|t| t.involves(user))
            .cloned()
            .collect())
    }

    async fn find_thread(&self, a: UserId, b: UserId) -> Result<Option<Thread>, StoreError> {
        if self
            .suppress_find
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(None);
        }
        let state = self.state.lock().unwrap();
        Ok(state.threads.iter().find(|t| t.is_between(a, b)).cloned())
    }

    async fn insert_thread(&self, a: UserId, b: UserId) -> Result<Thread, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.threads.iter().any(|t| t.is_between(a, b)) {
            return Err(StoreError::Conflict);
        }
        let thread = Thread {
            id: ThreadId::new(),
            user_a: a,
            user_b: b,
            created_at: Utc::now(),
        };
        state.threads.push(thread.clone());
        Ok(thread)
    }

    async fn fetch_messages(
        &self,
        thread: ThreadId,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut page: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.thread_id == thread)
            .filter(|m| before.map(|cutoff| m.created_at < cutoff).unwrap_or(true))
            .cloned()
            .collect();
        page.sort_by_key(|m| std::cmp::Reverse(m.sort_key()));
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn insert_message(&self, draft: MessageDraft) -> Result<Message, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_message_id;
        state.next_message_id += 1;
        let message = Message {
            id: MessageId(id),
            thread_id: draft.thread_id,
            sender_id: draft.sender_id,
            receiver_id: draft.receiver_id,
            body: draft.body,
            attachment: draft.attachment,
            read: false,
            created_at: Utc::now(),
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn mark_read(
        &self,
        thread: ThreadId,
        receiver: UserId,
    ) -> Result<Vec<MessageId>, StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut flipped = Vec::new();
        for m in state.messages.iter_mut() {
            if m.thread_id == thread && m.receiver_id == receiver && !m.read {
                m.read = true;
                flipped.push(m.id);
            }
        }
        Ok(flipped)
    }

    async fn unread_count(&self, thread: ThreadId, receiver: UserId) -> Result<u32, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .filter(|m| m.thread_id == thread && m.receiver_id == receiver && !m.read)
            .count() as u32)
    }

    async fn fetch_profiles(&self, users: &[UserId]) -> Result<Vec<Profile>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(users
            .iter()
            .filter_map(|id| state.profiles.get(id))
            .cloned()
            .collect())
    }
}

/// Log test output when `RUST_LOG` asks for it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
