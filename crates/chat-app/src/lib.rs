#![deny(unsafe_code)]

/// Client shell: session, feed and view wired around one event loop.
pub mod app;
/// Builds the store, identity and app from settings.
pub mod bootstrap;
/// Feed state, compose flow and the pure view.
pub mod chat;
pub mod error;
/// Layered settings and their persistence.
pub mod settings;
/// Line-oriented front end over any async reader and writer.
pub mod terminal;

pub use app::{AppEvent, ChatApp, Intent};
pub use error::{ChatError, ChatResult};
