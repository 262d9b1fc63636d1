pub mod error;
pub mod frame;
pub mod watcher;

pub use error::{NotifyError, Result};
pub use frame::{Frame, FrameSink, TIMEOUT_MESSAGE, VecSink};
pub use watcher::{Notifier, NotifierSettings};
