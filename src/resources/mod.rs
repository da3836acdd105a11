//! Backend entities, their CRUD service and the image upload side-channel.

pub mod media;
pub mod models;
pub mod service;
