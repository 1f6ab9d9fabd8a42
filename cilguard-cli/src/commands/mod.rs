pub mod refs;
pub mod scan;
