pub mod command;
pub mod error;
pub mod service;

pub use command::JobCreateCmd;
pub use error::{JobError, Result};
pub use service::{JobDetail, JobService, JobSummary};
