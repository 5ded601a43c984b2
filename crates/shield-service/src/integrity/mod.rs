pub mod diff;
pub mod scanner;
