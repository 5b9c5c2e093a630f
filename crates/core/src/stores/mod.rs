pub mod cosmos;

pub use cosmos::{CosmosClient, CosmosContainer};
