pub mod client;
pub mod error;

pub use client::RedisClient;
pub use error::RedisError;
