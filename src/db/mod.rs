pub mod config;
pub mod diesel_pool;
pub mod kvs;
pub mod redis_config;
pub mod redis_pool;

pub use config::DatabaseConfig;
pub use diesel_pool::{
    check_diesel_health, create_diesel_pool, mask_connection_string, DieselDatabaseConfig,
    DieselPool,
};
pub use kvs::keys as kvs_keys;
pub use redis_config::RedisConfig;
pub use redis_pool::RedisPool;
