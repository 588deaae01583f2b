#![allow(clippy::enum_variant_names)]

pub mod config;
pub mod disc;
pub mod ext;
pub mod iso9660;
pub mod project;
pub mod vfs;
