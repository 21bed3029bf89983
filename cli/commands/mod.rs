pub mod auto;
pub mod debug;
pub mod generate;
pub mod registry;
