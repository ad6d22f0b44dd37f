//! # CLI Command Implementations
//!
//! One file per subcommand. Each defines an `Args` struct derived with
//! `clap` and an `execute` function that drives the `bundle_sync` library.

pub mod download;
