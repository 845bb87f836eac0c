pub mod platform;
pub mod tenant;
