pub mod env;
pub mod http;
