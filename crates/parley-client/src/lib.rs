//! # parley-client
//!
//! Composition layer of the Parley sync core: session restore, the OTP
//! login flow, connection-code exchange, and the [`Messenger`] facade that
//! wires the thread/message stores to a [`DataBackend`] and to the realtime
//! ingest loop.
//!
//! A typical embedding signs in (or restores a session), constructs a
//! `Messenger`, spawns `messenger.ingest(..).run(feed)` on the change-feed
//! subscription, and renders from store events:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # async fn wire<B, F>(backend: Arc<B>, feed: F) -> parley_client::Result<()>
//! # where B: parley_store::DataBackend + 'static, F: parley_sync::RealtimeFeed {
//! let session = parley_client::SessionStore::new()?;
//! let user = session.restore().expect("signed in");
//!
//! let messenger = parley_client::Messenger::new(backend, user.id);
//! let changes = feed.subscribe_changes(user.id).await.unwrap();
//! tokio::spawn(messenger.ingest(None).run(changes));
//!
//! messenger.refresh_threads().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod calls;
pub mod connect;
pub mod messenger;
pub mod session;

mod error;

pub use auth::{Auth, AuthApi};
pub use connect::{CodeApi, Connector};
pub use error::{ApiError, ClientError, Result};
pub use messenger::Messenger;
pub use session::{CurrentUser, SessionStore};
