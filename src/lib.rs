//! iptctl - idempotent iptables/ip6tables management
//!
//! The [`iptables`] module wraps the command-line backend behind a detected
//! handle; [`exec`] is the process seam it runs through and [`config`] holds
//! the file-backed settings the CLI builds handles from.

pub mod config;
pub mod exec;
pub mod iptables;
