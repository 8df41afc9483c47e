pub mod credits;
pub mod message;
pub mod prompt;
pub mod similarity;
