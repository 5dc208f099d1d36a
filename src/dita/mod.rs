pub mod apply;
pub mod assets;
pub mod extract;
pub mod graph;
pub mod profile;
pub mod tree;
pub mod xml;
