//! Lip-sync core - backend logic for the lip-sync previewer.
//!
//! This crate contains all business logic with zero UI dependencies:
//! running the external analysis tool under supervision, parsing its
//! cue files into a [`timeline::Timeline`], and keeping a playback
//! position in sync with the active mouth shape.
//!
//! It can be used by the terminal front-end or any GUI shell.

pub mod command;
pub mod config;
pub mod logging;
pub mod parsers;
pub mod playback;
pub mod session;
pub mod supervisor;
pub mod timeline;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
