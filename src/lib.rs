pub mod app;
pub mod clinical;
pub mod config;
pub mod cox;
pub mod domain;
pub mod dupes;
pub mod error;
pub mod expression;
pub mod fs_util;
pub mod gdc;
pub mod metadata;
pub mod output;
pub mod plot;
pub mod sorter;
pub mod stats;
pub mod store;
pub mod survival;
pub mod table;
pub mod tui;
