mod consumer_group;
mod consumer_group_configuration;
mod message_handler;

pub use consumer_group::{ConsumerGroup, ConsumerGroupBuilder};
pub use consumer_group_configuration::ConsumerGroupConfigurationBuilder;
pub use message_handler::{MessageHandler, MessageHandlerBuilder};
