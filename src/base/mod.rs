//! Base types and error handling.
//!
//! - [`neterror`]: the crate-wide [`NetError`](neterror::NetError) type
//! - [`context`]: conversions that attach host/domain context to I/O errors

pub mod context;
pub mod neterror;
