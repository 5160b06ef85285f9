pub mod align;
pub mod color;
pub mod consts;
pub mod controller;
pub mod engine;
pub mod error;
pub mod frame;
pub mod io;
pub mod job;
pub mod quality;
pub mod sequence;
pub mod stack;
pub mod worker;
