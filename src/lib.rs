//! Library crate for port-reach-rs exposing reusable modules.
pub mod config;
pub mod error;
pub mod firewall;
pub mod listener;
pub mod logging;
pub mod netdetect;
pub mod portlist;
pub mod ports;
pub mod prober;
pub mod scanner;
pub mod server;
pub mod types;
