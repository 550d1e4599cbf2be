pub mod chat;
pub mod clear;
pub mod doctor;
pub mod export;
pub mod import;
pub mod key;
pub mod session;
