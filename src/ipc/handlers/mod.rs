pub mod core;
pub mod setup;
pub mod timetable;
pub mod tracker;
