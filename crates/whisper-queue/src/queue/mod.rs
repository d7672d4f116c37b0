//! FIFO task scheduling and the single background worker

pub mod scheduler;
pub mod worker;

pub use scheduler::{QueueInfo, TaskQueue};
pub use worker::QueueWorker;
