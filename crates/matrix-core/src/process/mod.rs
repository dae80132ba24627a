//! Child process spawning with line-by-line output streaming.

mod runner;

pub use runner::{ProcessEvent, ProcessEventHandler, ProcessHandle, ProcessOutput, ProcessRunner};
