pub mod command;
pub mod service;

pub use command::{EvaluateCreateCmd, EvaluateKind};
pub use service::EvaluateService;
