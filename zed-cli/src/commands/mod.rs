pub mod compile;
pub mod zson;
