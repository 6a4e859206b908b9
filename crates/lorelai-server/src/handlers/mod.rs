pub mod health;
pub mod indexing;
pub mod integrations;
