pub mod frankfurter;
pub mod splitwise;
