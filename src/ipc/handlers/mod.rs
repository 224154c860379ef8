pub mod core;
pub mod grading;
pub mod marks;
pub mod results;
pub mod students;
pub mod subjects;
