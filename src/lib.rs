//! passverify: moves visitor-pass requests from a mailbox into a shared
//! spreadsheet and emits a QR credential per visitor.

pub mod config;
pub mod credential;
pub mod decoder;
pub mod error;
pub mod mail;
pub mod model;
pub mod pipeline;
pub mod sheets;
pub mod staging;
