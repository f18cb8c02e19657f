//! Terminal policy for the playout binaries.
//!
//! Colour decisions live here so every binary honours `NO_COLOR`,
//! `CLICOLOR_FORCE` and TTY detection the same way.

mod color;

pub use color::ColorWhen;
