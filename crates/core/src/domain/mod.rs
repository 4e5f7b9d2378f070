pub mod cost;
pub mod intent;
pub mod query;
pub mod response;
pub mod tool;
