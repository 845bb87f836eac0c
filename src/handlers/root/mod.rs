// handlers/root/mod.rs - Platform administration handlers

pub mod tenant; // /api/root/tenant
