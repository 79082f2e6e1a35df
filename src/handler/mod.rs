pub mod downline;
