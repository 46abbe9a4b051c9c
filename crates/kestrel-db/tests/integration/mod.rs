mod common;
mod fetch_log_tests;
mod job_queue_tests;
mod redis_store_tests;
mod resource_tests;
