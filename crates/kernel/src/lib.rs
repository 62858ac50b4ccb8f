//! Canopy page-tree kernel.
//!
//! Keeps a draft tree and a published tree of pages for every site. Pages
//! are edited in the draft tree and copied into the published tree one at
//! a time, with revisions tracking page content across both.
//!
//! [`PageService`] is the entry point; [`storage`] holds the PostgreSQL and
//! in-memory backends it runs against.

pub mod commands;
pub mod config;
pub mod content;
pub mod db;
pub mod definitions;
pub mod error;
pub mod models;
pub mod observer;
pub mod publish;
pub mod service;
pub mod site;
pub mod storage;
pub mod tree;

pub use error::{PageError, PageResult, ValidationErrors};
pub use observer::{ObserverRegistry, PageEvent, PageObserver, TracingObserver};
pub use service::{PageService, TreeEntry};
pub use storage::{MemoryPageStore, PageStore, PgPageStore};
