pub mod appointment;
pub mod audit;
pub mod clinical;
pub mod event;
pub mod feed;
pub mod notification;
pub mod professional;
pub mod role;
pub mod tenant;
pub mod timestamp;
pub mod user;
