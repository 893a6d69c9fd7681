pub mod callbacks;
pub mod files;
