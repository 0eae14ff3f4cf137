pub mod pool;

pub use pool::{spawn_channel_workers, WorkerConfig};
