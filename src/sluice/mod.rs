pub mod config;
pub mod error;
pub mod storage;
pub mod stream;
pub mod window;
