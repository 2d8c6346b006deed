//! Chat Warden: rule-driven moderation pipeline for Telegram group chats.

pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod message;
pub mod modules;
pub mod pipeline;
pub mod policy;
pub mod store;
pub mod transport;
