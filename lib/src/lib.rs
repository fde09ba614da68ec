//! Sequential batch email dispatch.
//!
//! A batch is an ordered list of recipients, each with an address, an image
//! link and an optional name. One templated message is rendered per recipient
//! and sent one at a time, tracking per-recipient progress and outcome. A
//! failure that looks like it affects every remaining recipient (bad
//! credentials and the like) stops the run early.

#[macro_use]
extern crate serde_derive;

pub mod batch;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod email;
pub mod entry;
pub mod error;
pub mod history;
pub mod mock;
pub mod routes;
pub mod store;
pub mod table;
pub mod tracing;
pub mod validate;

#[cfg(feature = "axum")]
pub mod axum;

pub use batch::BatchController;
pub use config::Config;
pub use db::Database;
pub use dispatch::{Dispatcher, Event, Options, Progress, Summary};
pub use email::{SendOutcome, Sender, Template};
pub use entry::{Entry, EntryId, Status};
pub use error::{Error, ErrorKind, Result};
pub use store::{Settings, Store};
