pub mod error;

pub mod config;
pub mod context;
pub mod validation;

pub mod client;
pub mod credentials;
pub mod identity;
pub mod metadata;
pub mod session;
pub mod sign;

pub mod cmd;
