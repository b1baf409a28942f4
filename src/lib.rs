pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod filter;
pub mod fs_util;
pub mod geo;
pub mod miniml;
pub mod output;
pub mod sheets;
pub mod table;
pub mod workbook;
pub mod workspace;
