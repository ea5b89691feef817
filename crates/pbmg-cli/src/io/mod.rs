pub mod dx;
pub mod pqr;
pub mod tables;
