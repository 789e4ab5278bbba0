pub mod cli;
pub mod enumerate;
pub mod job;
pub mod metatile;
pub mod progress;
pub mod render;
pub mod tile;
pub mod writer;
