//! Authenticated client core for the tasks API.
//!
//! # Overview
//! Fetches, creates, updates and deletes tasks and lists the model catalog of
//! one org/project on a remote tasks API. Every call carries a bearer token
//! obtained through the OAuth client-credentials grant and cached by a
//! shared `TokenStore`.
//!
//! # Design
//! - `TasksClient` splits each operation into `build_*` (produces a request)
//!   and `parse_*` (consumes a response); the high-level methods run the
//!   round-trip through an injected `Transport`.
//! - `TokenStore` serializes refreshes behind one lock and reads time from an
//!   injected `mockable::Clock`, so caching is deterministic under test.
//! - Updates are two-phase: submit a revision, then promote it. A failed
//!   promotion is reported as `Error::Consistency`.
//! - Calls are blocking and never retried.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod output_format;
pub mod requests;
pub mod testing;
pub mod token;
pub mod types;

pub use client::TasksClient;
pub use config::{token_endpoint, ClientConfig};
pub use error::{Error, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError, UreqTransport};
pub use mockable::{Clock, DefaultClock};
pub use output_format::{ExtendedOutputFormat, OutputFormatValue};
pub use requests::{CreateTaskRequest, TaskProperties, UpdateTaskRequest};
pub use token::TokenStore;
pub use types::{InputProcessor, Model, Rag, Revision, Task};
