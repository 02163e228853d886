// Declare modules within the adapters directory
pub mod in_memory_cache;
pub mod in_memory_event_bus;
pub mod in_memory_store;
pub mod logging_push_gateway;
pub mod postgres_store;
pub mod redis_cache;
