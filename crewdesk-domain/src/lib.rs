//! Entities of the crewdesk job-tracking dashboard.
//!
//! Every entity implements [`crewdesk_data::Entity`] with `Create` and
//! `Update` payload types that carry only writable columns.
//! [`resources`] builds configured CRUD and item resources for them.

pub mod job;
pub mod notification;
pub mod organisation;
pub mod resources;
pub mod user;

pub use job::{CreateJob, CreateJobFile, Job, JobFile, JobStatus, UpdateJob, UpdateJobFile};
pub use notification::{CreateNotification, Notification, UpdateNotification};
pub use organisation::{
    CreateLocation, CreateOrganisation, Location, Organisation, UpdateLocation, UpdateOrganisation,
};
pub use user::{CreateUser, UpdateUser, User, UserRole};

pub mod prelude {
    //! Re-exports of the dashboard entities and their status enums.
    pub use crate::resources;
    pub use crate::{Job, JobFile, JobStatus, Location, Notification, Organisation, User, UserRole};
}
