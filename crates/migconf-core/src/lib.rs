pub mod config;
pub mod engine;
pub mod errors;
pub mod expand;
pub mod fingerprint;
pub mod link;
pub mod mailer;
pub mod model;
pub mod notify;
pub mod providers;
pub mod report;
pub mod sql;
pub mod storage;
pub mod template;
pub mod validation;
