pub mod zedc;
