// Data models for the auth API

pub mod api;
pub mod user;

pub use user::{ProfileUpdate, SubscriptionTier, User};
