pub mod booking;
pub mod phone;
pub mod ports;
pub mod session;
