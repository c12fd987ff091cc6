pub mod classrooms;
pub mod core;
pub mod schedule;
pub mod slots;
pub mod teachers;
