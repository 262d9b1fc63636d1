pub mod command;
pub mod service;

pub use command::InferenceCreateCmd;
pub use service::InferenceService;
