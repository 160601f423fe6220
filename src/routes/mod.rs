pub mod admin;
pub mod booking;
pub mod events;
pub mod public;
