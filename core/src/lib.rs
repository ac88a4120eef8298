//! Blocking client for the Firefly school platform's task listings.
//!
//! # Overview
//! Connecting is three steps: resolve the school code to its portal through
//! the directory service, verify the device token to obtain a session cookie,
//! then query task listings with that session. Listings are cached until a
//! forced refresh.
//!
//! ```no_run
//! use firefly_core::{ClientConfig, FetchOptions, SessionClient, SessionState, UreqTransport};
//!
//! # fn main() -> Result<(), firefly_core::FireflyError> {
//! firefly_core::config::load_dotenv();
//! let config = ClientConfig::from_env()?;
//! let client = SessionClient::connect(&config, UreqTransport::new())?;
//!
//! if let SessionState::AwaitingManualToken { bootstrap_url } = client.state() {
//!     println!("log in at {bootstrap_url}, then set TOKEN");
//!     return Ok(());
//! }
//!
//! let tasks = client.task_fetcher().expect("authenticated");
//! for task in tasks.fetch(&FetchOptions::new())?.iter() {
//!     println!("{}", task.title().unwrap_or("(untitled)"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! - Every protocol step is a `build_*` / `parse_*` pair over plain
//!   `HttpRequest` / `HttpResponse` values; a [`Transport`] runs the
//!   round-trip. [`UreqTransport`] is the blocking implementation.
//! - Nothing retries. A failed request is a failed operation.

pub mod config;
pub mod error;
pub mod http;
pub mod options;
pub mod portal;
pub mod session;
pub mod tasks;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ClientConfig;
pub use error::{ApiError, FireflyError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use options::{
    ArchiveStatus, CompletionStatus, FetchOptions, MarkingStatus, OwnerType, ReadStatus, SortColumn, SortOrder,
    SortingCriterion, TaskFilter,
};
pub use portal::PortalResolver;
pub use session::{Credentials, SessionClient, SessionState};
pub use tasks::TaskFetcher;
pub use transport::{Transport, UreqTransport};
pub use types::{ApiVersion, Identity, PortalAddress, Scheme, Task};
