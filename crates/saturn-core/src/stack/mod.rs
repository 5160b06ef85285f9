pub mod accumulator;
pub mod flat_field;
pub mod triangulation;

pub use accumulator::StackAccumulator;
pub use flat_field::FlatField;
pub use triangulation::{Triangle, Triangulation};
