use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crewdesk_cache::FilterValue;
use crewdesk_data::Entity;

/// Lifecycle of a job. Stored upper-case (`"IN_PROGRESS"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Available,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Available,
        JobStatus::Assigned,
        JobStatus::InProgress,
        JobStatus::Completed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Available => "AVAILABLE",
            JobStatus::Assigned => "ASSIGNED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }

    /// Statuses reachable from this one.
    pub fn next(self) -> &'static [JobStatus] {
        match self {
            JobStatus::Available => &[JobStatus::Assigned, JobStatus::Cancelled],
            JobStatus::Assigned => &[JobStatus::Available, JobStatus::InProgress, JobStatus::Cancelled],
            JobStatus::InProgress => &[JobStatus::Completed, JobStatus::Cancelled],
            JobStatus::Completed | JobStatus::Cancelled => &[],
        }
    }

    pub fn can_become(self, next: JobStatus) -> bool {
        self.next().contains(&next)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<JobStatus> for FilterValue {
    fn from(status: JobStatus) -> Self {
        FilterValue::Text(status.as_str().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: JobStatus,
    pub organisation_id: String,
    pub location_id: Option<String>,
    pub manager_id: Option<String>,
    pub contractor_id: Option<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn is_assigned(&self) -> bool {
        self.contractor_id.is_some()
    }

    /// Assign `contractor_id`; the changes also move an available job to
    /// `ASSIGNED`.
    pub fn assign(&self, contractor_id: impl Into<String>) -> UpdateJob {
        UpdateJob {
            contractor_id: Some(contractor_id.into()),
            status: (self.status == JobStatus::Available).then_some(JobStatus::Assigned),
            ..UpdateJob::default()
        }
    }

    /// Mark completed now.
    pub fn complete(&self) -> UpdateJob {
        self.complete_at(Utc::now())
    }

    pub fn complete_at(&self, at: DateTime<Utc>) -> UpdateJob {
        UpdateJob {
            status: Some(JobStatus::Completed),
            completed_at: Some(at),
            ..UpdateJob::default()
        }
    }
}

impl Entity for Job {
    type Create = CreateJob;
    type Update = UpdateJob;

    fn table_name() -> &'static str {
        "jobs"
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJob {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: JobStatus,
    pub organisation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_skills: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl CreateJob {
    /// An available job with only the required fields set.
    pub fn new(title: impl Into<String>, organisation_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: JobStatus::Available,
            organisation_id: organisation_id.into(),
            location_id: None,
            manager_id: None,
            required_skills: Vec::new(),
            scheduled_for: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJob {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contractor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_skills: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFile {
    pub id: String,
    pub job_id: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub uploaded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for JobFile {
    type Create = CreateJobFile;
    type Update = UpdateJobFile;

    fn table_name() -> &'static str {
        "job_files"
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobFile {
    pub job_id: String,
    pub file_name: String,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJobFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}
