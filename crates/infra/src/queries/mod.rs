//! Entity query keys and cached resource APIs

pub mod keys;
pub mod resources;

pub use keys::{
    dashboard, invalidate, user_profile, EntityKeys, INVENTORY, PATIENTS, REPORTS, USERS,
};
pub use resources::{cached_get, cached_observe, DashboardApi, ResourceApi};
