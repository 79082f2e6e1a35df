pub mod downlinedtos;
