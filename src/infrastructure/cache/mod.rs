pub mod redis_recorder;

pub use redis_recorder::{RedisConfig, RedisSentRecorder};
