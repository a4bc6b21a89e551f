//! Telegram chat bot relaying conversations to Google Gemini.

pub mod adapter;
pub mod bot;
pub mod chat;
pub mod config;
pub mod geo;
pub mod llm;
pub mod media;
pub mod pipeline;
pub mod response;
