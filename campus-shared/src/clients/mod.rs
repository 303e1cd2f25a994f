pub mod rabbitmq;
pub mod redis;

pub use rabbitmq::RabbitMQClient;
pub use redis::RedisClient;
