//! # Kiln Core
//!
//! Domain vocabulary of the compute-instance broker: request indexes,
//! instances and the patches the execution platform reports back.

pub mod clock;
pub mod error;
pub mod instance;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, Result};
pub use instance::{DetailPatch, Instance, InstanceDetail, STATUS_SCHEDULE_FAILED};
pub use types::{Flavor, InstanceId, JobHandle, RequestIndex};
