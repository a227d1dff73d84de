pub mod error;
pub mod executor;
pub mod job_manager;
pub mod parser;
pub mod scheduler;
pub mod shell;
pub mod source;

pub use error::ShellError;
pub use shell::{Mode, Shell};
