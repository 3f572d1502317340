pub mod booking;
pub mod movie;
pub mod room;
pub mod schedule;
