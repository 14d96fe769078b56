pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod gate;
pub mod models;
pub mod notify;
pub mod permissions;
pub mod session;
pub mod storage;
pub mod workspace;

pub use error::{Error, Result};
