//! CLI subcommand implementations for threadview.
//!
//! - [`view`] - open a conversation from a JSON file and drive it from stdin
//!
//! # Usage
//!
//! ```ignore
//! use threadview::commands;
//!
//! commands::view::run(&file_path, &config)?;
//! ```

pub mod view;
