//! Core types shared by every pppackage component
//!
//! - [`error`]: the [`PpError`] taxonomy and user-facing [`ErrorContext`]
//! - [`scope`]: fail-fast structured fan-out used for every concurrent step

pub mod error;
pub mod scope;

pub use error::{
    EXIT_FAILURE, EXIT_NO_MODEL, ErrorContext, PpError, exit_code, user_friendly_error,
};
pub use scope::scoped;
