// src/lib.rs

//! Catalog sitemap generator library

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod sitemap;
pub mod source;
pub mod storage;
pub mod utils;
