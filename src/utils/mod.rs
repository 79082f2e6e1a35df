pub mod currency;
pub mod date;
