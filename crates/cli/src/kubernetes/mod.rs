pub mod client;

pub use client::{RunFetcher, TaskRunClient};
