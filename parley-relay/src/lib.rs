pub mod discord;
pub mod forward;
pub mod http;
pub mod state;
pub mod watcher;
