//! # vscrub
//!
//! Backup-first removal of Visual Studio Code and its machine footprint.
//!
//! vscrub finds VS Code's installs, user data, extensions, caches, registry
//! entries and machine identifier, snapshots them into a timestamped backup,
//! then removes them according to one of three profiles:
//!
//! - **Basic**: installs, user data and the core registry keys
//! - **Complete**: also extensions, caches, file associations and context menus
//! - **Ultimate**: also temp leftovers, uninstall entries and an identifier reset
//!
//! Every run is observable through a [`common::ProgressSink`] and ends in a
//! [`orchestrator::RunReport`]. Platform access (registry, processes, restore
//! points, privilege) sits behind the traits in [`platform`], so the whole
//! pipeline runs against in-memory doubles in tests.

pub mod backup;
pub mod cli;
pub mod common;
pub mod identity;
pub mod locator;
pub mod orchestrator;
pub mod platform;
pub mod reaper;
