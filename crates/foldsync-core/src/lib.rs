//! foldsync core - domain types, configuration and ports
//!
//! This crate holds everything the synchronization engine needs that is not
//! tied to a concrete filesystem or notification backend:
//! - **Domain types** - `Change`, `ChangeKind`, `SyncMode`, `FileAction`, `RootPair`
//! - **Configuration** - typed YAML configuration with validation and a builder
//! - **Ports** - the `SyncLogger` trait the engine reports through
//!
//! # Architecture
//!
//! The engine crate (`foldsync-sync`) depends on this crate for its data model
//! and for the logger port. Process hosts (daemon, CLI) load a [`config::Config`]
//! and pick the logger implementations to inject.

pub mod config;
pub mod domain;
pub mod ports;
