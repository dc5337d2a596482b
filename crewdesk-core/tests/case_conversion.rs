use crewdesk_core::{camelize, decamelize};
use serde_json::json;

#[test]
fn test_camelize_nested_objects_and_arrays() {
    let wire = json!({
        "id": "j1",
        "created_at": "2026-01-01T00:00:00Z",
        "assigned_contractor": { "full_name": "Ada", "phone_number": null },
        "job_files": [ { "file_name": "a.pdf", "size_bytes": 12 } ],
        "tags": ["needs_review", "on_hold"]
    });
    let app = camelize(wire);
    assert_eq!(
        app,
        json!({
            "id": "j1",
            "createdAt": "2026-01-01T00:00:00Z",
            "assignedContractor": { "fullName": "Ada", "phoneNumber": null },
            "jobFiles": [ { "fileName": "a.pdf", "sizeBytes": 12 } ],
            "tags": ["needs_review", "on_hold"]
        })
    );
}

#[test]
fn test_primitive_leaves_untouched() {
    assert_eq!(camelize(json!("snake_value")), json!("snake_value"));
    assert_eq!(decamelize(json!(3)), json!(3));
    assert_eq!(camelize(json!(null)), json!(null));
}

#[test]
fn test_decamelize_then_camelize_round_trips() {
    let app = json!({
        "organisationId": "o1",
        "location": { "addressLine": "1 Main St", "postCode": "AB1" },
        "items": [ { "unitPrice": 10, "isTaxable": true } ],
        "status": "AVAILABLE"
    });
    let wire = decamelize(app.clone());
    assert_eq!(wire["organisation_id"], "o1");
    assert_eq!(wire["location"]["address_line"], "1 Main St");
    assert_eq!(camelize(wire), app);
}
