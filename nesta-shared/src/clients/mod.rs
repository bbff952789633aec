pub mod store;
pub mod dynamo;
pub mod vector;
pub mod rabbitmq;
