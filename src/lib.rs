//! # storagenet
//!
//! Transport handle pooling for a cloud object-storage HTTP client.
//!
//! The REST layer talks to storage through request handles. Creating a
//! handle is expensive (it owns a TLS context and keeps a warm keep-alive
//! connection), so handles come from a factory that may reuse them.
//!
//! ## Factories
//!
//! - [`DefaultHandleFactory`](transport::DefaultHandleFactory): a new handle
//!   per request, destroyed on return
//! - [`PooledHandleFactory`](transport::PooledHandleFactory): bounded,
//!   thread-safe reuse of released handles
//! - [`default_handle_factory`](transport::default_handle_factory): the
//!   process-wide shared default factory
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use storagenet::transport::{lease_handle, PooledHandleFactory, SharedHandleFactory};
//!
//! #[tokio::main]
//! async fn main() {
//!     let factory: SharedHandleFactory = Arc::new(PooledHandleFactory::with_maximum_size(8));
//!     let mut handle = lease_handle(&factory).unwrap();
//!     handle.set_url("https://storage.example.com/b/bucket".parse().unwrap());
//!     let response = handle.perform().await.unwrap();
//!     println!("Status: {}", response.status());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error definitions and error context helpers
//! - [`transport`] - Handles, factories, pooling and TLS options

pub mod base;
pub mod transport;
