pub mod config;
pub mod database;
pub mod errors;
pub mod llm;
pub mod models;
pub mod processing;
pub mod providers;
pub mod ratelimit;
pub mod service;
pub mod storage;
pub mod web;
