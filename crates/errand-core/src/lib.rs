//! # Errand Core
//!
//! Core types shared by every Errand crate.
//!
//! - [`ErrandError`] - The error taxonomy; each variant maps to one HTTP status
//! - [`Principal`] - The authenticated identity attached to a request
//! - [`RequestId`] - UUID v7 request identifier used for log correlation

#![doc(html_root_url = "https://docs.rs/errand-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod identity;

pub use context::RequestId;
pub use error::{ErrandError, ErrandResult, ErrorBody, ErrorCategory};
pub use identity::Principal;
