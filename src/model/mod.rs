pub mod config;
pub mod melody;
pub mod note;
pub mod rest;
