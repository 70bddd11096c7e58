pub mod config;
pub mod errors;
pub mod format;
pub mod logging;
pub mod permissions;
pub mod progress;
pub mod safety;
pub mod session;

pub use errors::RemovalError;
pub use session::SessionId;
pub use progress::{NullSink, ProgressSink, RecordingSink, Reporter, StatusLevel};
