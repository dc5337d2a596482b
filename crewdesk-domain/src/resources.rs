//! Configured resources for the dashboard tables.
//!
//! ```no_run
//! use crewdesk_data::{DataLayer, InMemoryBackend};
//! use crewdesk_domain::{resources, JobStatus};
//!
//! # async fn demo() {
//! let layer = DataLayer::new(InMemoryBackend::new());
//! let available = resources::jobs(&layer).list(resources::jobs_with_status(JobStatus::Available));
//! let jobs = available.load().await;
//! # }
//! ```

use std::time::Duration;

use crewdesk_cache::{OrderBy, QueryKeys};
use crewdesk_data::{
    CrudConfig, CrudResource, DataLayer, Entity, ItemConfig, ItemResource, ListOptions,
};

use crate::job::{Job, JobFile, JobStatus};
use crate::notification::Notification;
use crate::organisation::{Location, Organisation};
use crate::user::{User, UserRole};

/// Key root of the signed-in user's profile.
pub const CURRENT_USER_KEY: &str = "current-user";

/// Notifications are polled more often than the other tables.
pub const NOTIFICATION_STALE_TIME: Duration = Duration::from_secs(30);

/// The key factory of an entity's table.
pub fn keys<E: Entity>() -> QueryKeys {
    QueryKeys::new(E::table_name())
}

pub fn users(layer: &DataLayer) -> CrudResource<User> {
    CrudResource::for_entity(layer)
}

pub fn user(layer: &DataLayer) -> ItemResource<User> {
    ItemResource::for_entity(layer)
}

/// The signed-in user's profile, cached under `["current-user", id]`.
pub fn current_user(layer: &DataLayer) -> ItemResource<User> {
    layer.item(ItemConfig::new(User::table_name(), CURRENT_USER_KEY))
}

pub fn organisations(layer: &DataLayer) -> CrudResource<Organisation> {
    CrudResource::for_entity(layer)
}

pub fn organisation(layer: &DataLayer) -> ItemResource<Organisation> {
    ItemResource::for_entity(layer)
}

pub fn locations(layer: &DataLayer) -> CrudResource<Location> {
    CrudResource::for_entity(layer)
}

pub fn jobs(layer: &DataLayer) -> CrudResource<Job> {
    layer.crud(CrudConfig::for_entity::<Job>().with_array_columns(["requiredSkills"]))
}

pub fn job(layer: &DataLayer) -> ItemResource<Job> {
    ItemResource::for_entity(layer)
}

pub fn job_files(layer: &DataLayer) -> CrudResource<JobFile> {
    CrudResource::for_entity(layer)
}

pub fn notifications(layer: &DataLayer) -> CrudResource<Notification> {
    layer.crud(
        CrudConfig::for_entity::<Notification>()
            .with_stale_time(NOTIFICATION_STALE_TIME)
            // A failed poll should not interrupt the user.
            .with_notify_errors(false),
    )
}

/// Newest jobs first.
pub fn recent_jobs() -> ListOptions {
    ListOptions::new().order_by(OrderBy::desc("createdAt"))
}

pub fn jobs_with_status(status: JobStatus) -> ListOptions {
    recent_jobs().filter("status", status)
}

pub fn jobs_for_organisation(organisation_id: &str) -> ListOptions {
    recent_jobs().filter("organisationId", organisation_id)
}

pub fn jobs_for_contractor(contractor_id: &str) -> ListOptions {
    recent_jobs().filter("contractorId", contractor_id)
}

pub fn files_for_job(job_id: &str) -> ListOptions {
    ListOptions::new()
        .filter("jobId", job_id)
        .order_by(OrderBy::asc("createdAt"))
}

pub fn users_with_role(role: UserRole) -> ListOptions {
    ListOptions::new().filter("role", role)
}

pub fn locations_for_organisation(organisation_id: &str) -> ListOptions {
    ListOptions::new()
        .filter("organisationId", organisation_id)
        .order_by(OrderBy::asc("name"))
}

pub fn unread_notifications(user_id: &str) -> ListOptions {
    ListOptions::new()
        .filter("userId", user_id)
        .filter("isRead", false)
        .order_by(OrderBy::desc("createdAt"))
}
