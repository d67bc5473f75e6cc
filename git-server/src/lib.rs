//! Git hooks feeding received pushes into the patch translator.
pub mod error;

#[cfg(feature = "hooks")]
pub mod hooks;
