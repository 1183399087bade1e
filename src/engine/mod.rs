pub mod book;
pub mod types;
