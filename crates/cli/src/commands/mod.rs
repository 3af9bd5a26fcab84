pub mod chat;
pub mod config_cmd;
pub mod popular;
pub mod runtime;
pub mod seed;
