pub mod controller;
pub mod duplicate;
pub mod filter;
pub mod image;
pub mod progress;
pub mod scanner;
pub mod signature;
pub mod similarity;
pub mod units;
