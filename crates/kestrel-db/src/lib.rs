pub mod config;
pub mod database;
pub mod fetch_log_repository;
pub mod job_repository;
pub mod redis_store;
pub mod resource_repository;

pub use config::{DatabaseConfig, RedisConfig};
pub use database::Database;
pub use fetch_log_repository::FetchLogRepository;
pub use job_repository::FetchJobRepository;
pub use redis_store::RedisStore;
pub use resource_repository::ResourceRepository;
