//! Query key factories
//!
//! Keys are hierarchical: `[entity]`, `[entity, "list"]`,
//! `[entity, "list", filters]`, `[entity, "detail"]` and
//! `[entity, "detail", id]`. Invalidating a prefix invalidates everything
//! below it.

use cuidar_common::cache::{QueryClient, QueryFailure, QueryKey};
use cuidar_common::resilience::Clock;
use serde_json::Value;

/// Key factory for one backend entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityKeys {
    root: &'static str,
}

impl EntityKeys {
    pub const fn new(root: &'static str) -> Self {
        Self { root }
    }

    pub fn name(&self) -> &'static str {
        self.root
    }

    pub fn all(&self) -> QueryKey {
        QueryKey::root(self.root)
    }

    pub fn lists(&self) -> QueryKey {
        self.all().child("list")
    }

    /// `filters` is part of the key; pass `Value::Null` for "no filters".
    pub fn list(&self, filters: &Value) -> QueryKey {
        self.lists().child(filters.clone())
    }

    pub fn details(&self) -> QueryKey {
        self.all().child("detail")
    }

    pub fn detail(&self, id: &str) -> QueryKey {
        self.details().child(id)
    }
}

pub const PATIENTS: EntityKeys = EntityKeys::new("patients");
pub const INVENTORY: EntityKeys = EntityKeys::new("inventory");
pub const REPORTS: EntityKeys = EntityKeys::new("reports");
pub const USERS: EntityKeys = EntityKeys::new("users");

/// `["users", "profile"]`
pub fn user_profile() -> QueryKey {
    USERS.all().child("profile")
}

pub mod dashboard {
    use super::QueryKey;

    pub fn all() -> QueryKey {
        QueryKey::root("dashboard")
    }

    pub fn stats() -> QueryKey {
        all().child("stats")
    }

    pub fn recent_activity() -> QueryKey {
        all().child("recent-activity")
    }
}

/// Invalidation shortcuts; each returns the number of entries marked.
pub mod invalidate {
    use super::{dashboard as dashboard_keys, Clock, QueryClient, QueryFailure};
    use super::{INVENTORY, PATIENTS, REPORTS, USERS};

    pub fn patients<E: QueryFailure, C: Clock>(client: &QueryClient<E, C>) -> usize {
        client.invalidate(&PATIENTS.all())
    }

    pub fn inventory<E: QueryFailure, C: Clock>(client: &QueryClient<E, C>) -> usize {
        client.invalidate(&INVENTORY.all())
    }

    pub fn reports<E: QueryFailure, C: Clock>(client: &QueryClient<E, C>) -> usize {
        client.invalidate(&REPORTS.all())
    }

    pub fn users<E: QueryFailure, C: Clock>(client: &QueryClient<E, C>) -> usize {
        client.invalidate(&USERS.all())
    }

    pub fn dashboard<E: QueryFailure, C: Clock>(client: &QueryClient<E, C>) -> usize {
        client.invalidate(&dashboard_keys::all())
    }

    pub fn all<E: QueryFailure, C: Clock>(client: &QueryClient<E, C>) -> usize {
        client.invalidate_all()
    }
}
