//! Remote document service
//!
//! REST-backed implementations of the collaborator traits, for running the
//! registry against a shared document service instead of a local store.
//!
//! # Module Structure
//!
//! - [`http`] - HTTP utilities (auth header, status handling, log sanitizing)
//! - [`client`] - [`RemoteStore`], the collaborator implementations
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use opreg::remote::RemoteStore;
//!
//! async fn example() -> opreg::Result<()> {
//!     let store = RemoteStore::new("http://localhost:8000", Duration::from_secs(30), None)?;
//!     let endpoint = store.get("/resources/endpoints/aws-1").await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;

pub use client::RemoteStore;
pub use http::{format_http_error, HttpClient};
