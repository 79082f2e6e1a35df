pub mod downline_query;
pub mod downline_service;
pub mod downline_tree;
pub mod error;
pub mod export;
pub mod generation_source;
pub mod request_tracker;
