use chrono::{TimeZone, Utc};
use serde_json::json;

use crewdesk_core::{camelize, decamelize};
use crewdesk_domain::{
    CreateJob, Job, JobStatus, Location, Notification, UpdateJob, UpdateNotification, User,
    UserRole,
};

fn job_row() -> serde_json::Value {
    json!({
        "id": "j1",
        "title": "Rewire kitchen",
        "description": null,
        "status": "IN_PROGRESS",
        "organisation_id": "o1",
        "location_id": "l1",
        "manager_id": "u1",
        "contractor_id": "u2",
        "required_skills": ["electrical"],
        "scheduled_for": "2026-10-20T09:00:00Z",
        "completed_at": null,
        "created_at": "2026-10-01T08:00:00Z",
        "updated_at": null
    })
}

#[test]
fn job_decodes_from_camelized_row() {
    let job: Job = serde_json::from_value(camelize(job_row())).unwrap();

    assert_eq!(job.status, JobStatus::InProgress);
    assert_eq!(job.organisation_id, "o1");
    assert_eq!(job.required_skills, ["electrical"]);
    assert_eq!(
        job.scheduled_for,
        Some(Utc.with_ymd_and_hms(2026, 10, 20, 9, 0, 0).unwrap())
    );
    assert!(job.is_assigned());
}

#[test]
fn create_payload_has_only_set_fields() {
    let mut create = CreateJob::new("Fix boiler", "o1");
    create.manager_id = Some("u1".into());

    let wire = decamelize(serde_json::to_value(&create).unwrap());

    assert_eq!(
        wire,
        json!({"title": "Fix boiler", "status": "AVAILABLE", "organisation_id": "o1", "manager_id": "u1"})
    );
}

#[test]
fn update_payload_skips_absent_fields() {
    let update = UpdateJob {
        status: Some(JobStatus::Cancelled),
        ..UpdateJob::default()
    };
    assert_eq!(serde_json::to_value(&update).unwrap(), json!({"status": "CANCELLED"}));
    assert_eq!(serde_json::to_value(UpdateJob::default()).unwrap(), json!({}));
}

#[test]
fn assigning_an_available_job_moves_it_to_assigned() {
    let mut job: Job = serde_json::from_value(camelize(job_row())).unwrap();
    job.status = JobStatus::Available;
    job.contractor_id = None;

    let changes = job.assign("u7");
    assert_eq!(changes.contractor_id.as_deref(), Some("u7"));
    assert_eq!(changes.status, Some(JobStatus::Assigned));

    job.status = JobStatus::InProgress;
    assert_eq!(job.assign("u8").status, None);
}

#[test]
fn completing_sets_timestamp() {
    let job: Job = serde_json::from_value(camelize(job_row())).unwrap();
    let at = Utc.with_ymd_and_hms(2026, 10, 19, 17, 30, 0).unwrap();

    let changes = job.complete_at(at);

    assert_eq!(
        serde_json::to_value(&changes).unwrap(),
        json!({"status": "COMPLETED", "completedAt": "2026-10-19T17:30:00Z"})
    );
}

#[test]
fn status_transitions() {
    assert!(JobStatus::Available.can_become(JobStatus::Assigned));
    assert!(JobStatus::Assigned.can_become(JobStatus::InProgress));
    assert!(!JobStatus::Available.can_become(JobStatus::Completed));
    for status in JobStatus::ALL {
        assert_eq!(status.is_terminal(), status.next().is_empty());
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            json!(status.as_str())
        );
    }
}

#[test]
fn user_roles_and_display_name() {
    let user: User = serde_json::from_value(camelize(json!({
        "id": "u1",
        "email": "sam@example.com",
        "full_name": "  ",
        "phone": null,
        "role": "contractor",
        "organisation_id": null,
        "avatar_url": null,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": null
    })))
    .unwrap();

    assert_eq!(user.role, UserRole::Contractor);
    assert!(!user.role.manages_jobs());
    assert!(UserRole::Owner.manages_jobs());
    assert_eq!(user.display_name(), "sam@example.com");
}

#[test]
fn location_coordinates_need_both_parts() {
    let mut location: Location = serde_json::from_value(json!({
        "id": "l1",
        "organisationId": "o1",
        "name": "Depot",
        "address": null,
        "postcode": "M1 1AA",
        "latitude": 53.48,
        "longitude": -2.24,
        "createdAt": "2026-01-01T00:00:00Z"
    }))
    .unwrap();

    assert_eq!(location.coordinates(), Some((53.48, -2.24)));
    location.longitude = None;
    assert_eq!(location.coordinates(), None);
}

#[test]
fn notification_read_flag_defaults_to_unread() {
    let notification: Notification = serde_json::from_value(json!({
        "id": "n1",
        "userId": "u1",
        "title": "New job",
        "message": "Rewire kitchen is available",
        "link": "/jobs/j1",
        "createdAt": "2026-10-18T09:30:00Z"
    }))
    .unwrap();

    assert!(!notification.is_read);
    assert_eq!(
        serde_json::to_value(UpdateNotification::mark_read()).unwrap(),
        json!({"isRead": true})
    );
}
