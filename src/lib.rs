#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod automation;
pub mod config;
pub mod content;
pub mod credentials;
#[doc(hidden)]
pub mod diagnostics;
pub mod delivery;
pub mod engine;
pub mod entitlement;
pub mod error;
pub mod net;
pub mod platform;
pub mod recovery;
pub mod reviews;
pub mod security;
pub mod storage;

pub use config::Config;
pub use error::AutomationError;
