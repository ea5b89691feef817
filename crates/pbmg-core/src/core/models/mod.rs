pub mod atom;
pub mod molecule;
