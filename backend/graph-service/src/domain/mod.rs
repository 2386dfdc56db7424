pub mod edge;
pub mod state;
