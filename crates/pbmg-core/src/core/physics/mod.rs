pub mod constants;
pub mod debye_huckel;
pub mod ions;
pub mod splines;
