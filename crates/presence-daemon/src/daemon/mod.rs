pub mod event_loop;
pub mod signals;
pub mod watcher;

pub use event_loop::{EVENT_QUEUE_CAPACITY, run, start};
pub use signals::forward_signals;
pub use watcher::watch_config;
