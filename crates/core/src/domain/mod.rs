pub mod prediction;
pub mod signals;
pub mod user;
