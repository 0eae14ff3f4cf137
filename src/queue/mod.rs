pub mod job;
pub mod redis_queue;

pub use job::QueueJob;
pub use redis_queue::ChannelQueue;
