//! Error taxonomy shared with the networking layer.
//!
//! The ShipHub and GitHub clients live outside this crate; they report
//! failures as `ApiError` so that an `Auth` session can tell an
//! authentication rejection apart from a transport problem.

pub mod error;

pub use error::ApiError;
