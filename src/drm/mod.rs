// src/drm/mod.rs

//! Access to a kernel DRM device through the legacy modesetting interface.

pub mod card;
pub mod device;
pub mod query;
pub mod resources;
pub mod sys;

#[cfg(test)]
pub mod fake;

pub use card::Card;
