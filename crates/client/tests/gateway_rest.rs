//! End-to-end gateway behavior against a mocked tracker: query building,
//! cache reuse and invalidation, write fallbacks, and enumeration.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{any, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mantis_client::{IssueFilter, IssuePatch, MantisGateway, NewIssue, StatusChange};
use mantis_state::MantisConfig;

fn gateway_for(server: &MockServer) -> MantisGateway {
    MantisGateway::new(&MantisConfig::for_base_url(server.uri())).unwrap()
}

fn gateway_without_cache(server: &MockServer) -> MantisGateway {
    let config = MantisConfig {
        base_url: server.uri(),
        api_token: None,
        cache_enabled: false,
        cache_ttl: Duration::from_secs(300),
    };
    MantisGateway::new(&config).unwrap()
}

fn issue_page() -> Value {
    json!({
        "issues": [
            { "id": 101, "summary": "Crash on save", "status": { "id": 50, "name": "assigned" } },
            { "id": 102, "summary": "Wrong totals", "status": { "id": 10, "name": "new" } },
        ]
    })
}

#[tokio::test]
async fn test_list_issues_sends_documented_query_parameters() {
    // GIVEN a tracker expecting the translated filter
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/issues"))
        .and(query_param("project_id", "3"))
        .and(query_param("page_size", "2"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issue_page()))
        .expect(1)
        .mount(&server)
        .await;

    // WHEN listing with a project filter and explicit paging
    let gateway = gateway_for(&server);
    let filter = IssueFilter {
        project_id: Some(3),
        page_size: Some(2),
        page: Some(1),
        ..Default::default()
    };
    let listing = gateway.list_issues(&filter).await.unwrap();

    // THEN both issues map through
    assert_eq!(listing.issues.len(), 2);
    assert_eq!(listing.issues[0].id, 101);
    assert_eq!(listing.issues[0].status.name, "assigned");
}

#[tokio::test]
async fn test_repeated_list_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issue_page()))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let filter = IssueFilter::default();
    let first = gateway.list_issues(&filter).await.unwrap();
    let second = gateway.list_issues(&filter).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_disabled_cache_refetches_every_read() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issue_page()))
        .expect(2)
        .mount(&server)
        .await;

    let gateway = gateway_without_cache(&server);
    let filter = IssueFilter::default();
    gateway.list_issues(&filter).await.unwrap();
    gateway.list_issues(&filter).await.unwrap();
}

#[tokio::test]
async fn test_successful_write_invalidates_cached_reads() {
    // GIVEN a cached listing
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issue_page()))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/issues"))
        .and(body_partial_json(json!({ "project": { "id": 3 } })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "issue": { "id": 103, "summary": "Fresh" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let filter = IssueFilter::default();
    gateway.list_issues(&filter).await.unwrap();

    // WHEN an issue is created
    let created = gateway
        .create_issue(&NewIssue {
            summary: "Fresh".into(),
            description: "A fresh issue".into(),
            project_id: 3,
            category: None,
            priority_id: None,
            severity_id: None,
            handler_id: None,
        })
        .await
        .unwrap();
    assert_eq!(created.id, 103);

    // THEN the next listing goes back to the tracker
    gateway.list_issues(&filter).await.unwrap();
}

#[tokio::test]
async fn test_get_issue_unwraps_single_element_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/issues/101"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issues": [{ "id": 101, "summary": "Crash on save" }]
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let issue = gateway.get_issue(101).await.unwrap();

    assert_eq!(issue.id, 101);
    assert_eq!(issue.summary, "Crash on save");
}

#[tokio::test]
async fn test_get_user_zero_fails_without_touching_the_tracker() {
    // GIVEN a tracker that must see no traffic at all
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    // WHEN asking for user id zero
    let gateway = gateway_for(&server);
    let err = gateway.get_user(0).await.unwrap_err();

    // THEN the failure is local, with no HTTP status attached
    assert_eq!(err.status_code(), None);
}

#[tokio::test]
async fn test_repeated_get_user_hits_the_tracker_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/7"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": 7, "name": "jack" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let first = gateway.get_user(7).await.unwrap();
    let second = gateway.get_user(7).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.name, "jack");
}

#[tokio::test]
async fn test_enumeration_collects_users_and_stops_after_miss_run() {
    // GIVEN users 1, 2, and 5; everything else answers 404
    let server = MockServer::start().await;
    for (id, name) in [(1, "rose"), (2, "jack"), (5, "mickey")] {
        Mock::given(method("GET"))
            .and(path(format!("/users/{id}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": id, "name": name })),
            )
            .mount(&server)
            .await;
    }

    // WHEN enumerating
    let gateway = gateway_for(&server);
    let users = gateway.enumerate_users().await.unwrap();

    // THEN the gap at 3..4 is bridged and order is preserved
    let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["rose", "jack", "mickey"]);

    // The walk stopped after exactly ten consecutive misses past id 5.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 15);
    assert_eq!(requests.last().unwrap().url.path(), "/users/15");
}

#[tokio::test]
async fn test_enumeration_aborts_on_unexpected_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "name": "rose" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database gone"))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let err = gateway.enumerate_users().await.unwrap_err();

    assert_eq!(err.status_code(), Some(500));
}

#[tokio::test]
async fn test_update_with_bodyless_echo_refetches_the_issue() {
    // GIVEN a tracker that acknowledges updates with an empty body
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/issues/4"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/issues/4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issues": [{ "id": 4, "summary": "Adjusted" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // WHEN updating
    let gateway = gateway_for(&server);
    let patch = IssuePatch {
        summary: Some("Adjusted".into()),
        ..Default::default()
    };
    let issue = gateway.update_issue(4, &patch).await.unwrap();

    // THEN the refetched issue is returned
    assert_eq!(issue.summary, "Adjusted");
}

#[tokio::test]
async fn test_update_failure_propagates_without_refetch() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/issues/4"))
        .respond_with(ResponseTemplate::new(409).set_body_string("edit conflict"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/issues/4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "issues": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let err = gateway
        .update_issue(4, &IssuePatch::default())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(409));
    assert_eq!(err.body(), Some("edit conflict"));
}

#[tokio::test]
async fn test_change_status_posts_public_note_before_the_transition() {
    // GIVEN both endpoints mocked
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/issues/9/notes"))
        .and(body_partial_json(json!({
            "text": "Taking this one",
            "view_state": { "name": "public" }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "note": { "id": 31 } })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/issues/9"))
        .and(body_partial_json(json!({ "status": { "id": 50 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issues": [{ "id": 9, "summary": "Crash", "status": { "id": 50, "name": "assigned" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // WHEN changing status with a note
    let gateway = gateway_for(&server);
    let issue = gateway
        .change_status(
            9,
            &StatusChange {
                status_id: 50,
                resolution_id: None,
                note: Some("Taking this one".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(issue.status.id, 50);

    // THEN the note arrived before the transition
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].url.path(), "/issues/9/notes");
    assert_eq!(requests[1].url.path(), "/issues/9");
}

#[tokio::test]
async fn test_change_status_without_note_skips_the_note_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/issues/9/notes"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/issues/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issues": [{ "id": 9, "summary": "Crash" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    gateway
        .change_status(
            9,
            &StatusChange {
                status_id: 80,
                resolution_id: Some(20),
                note: None,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_add_note_returns_the_raw_tracker_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/issues/9/notes"))
        .and(body_partial_json(json!({
            "text": "Confirmed on trunk",
            "view_state": { "name": "public" },
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "note": { "id": 44, "text": "Confirmed on trunk" } })),
        )
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let payload = gateway
        .add_note(9, "Confirmed on trunk", false)
        .await
        .unwrap();

    // No reshaping: the envelope comes back exactly as sent
    assert_eq!(payload["note"]["id"], 44);
}

#[tokio::test]
async fn test_private_notes_carry_the_private_view_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/issues/9/notes"))
        .and(body_partial_json(json!({
            "view_state": { "name": "private" },
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "note": { "id": 45 } })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    gateway
        .add_note(9, "internal triage detail", true)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_username_lookups_survive_issue_mutations() {
    // GIVEN a username the gateway has already resolved
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/username/rose"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": 2, "name": "rose" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/issues"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "issue": { "id": 50, "summary": "New" } })),
        )
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    gateway.get_user_by_username("rose").await.unwrap();

    // WHEN a write clears the general cache
    gateway
        .create_issue(&NewIssue {
            summary: "New".into(),
            description: "d".into(),
            project_id: 1,
            category: None,
            priority_id: None,
            severity_id: None,
            handler_id: None,
        })
        .await
        .unwrap();

    // THEN the username entry is still served without a second lookup
    let user = gateway.get_user_by_username("rose").await.unwrap();
    assert_eq!(user.id, 2);
}

#[tokio::test]
async fn test_list_project_users_accepts_bare_array_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/3/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 2, "name": "rose" },
            { "id": 7, "name": "jack" },
        ])))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let users = gateway.list_project_users(3).await.unwrap();

    assert_eq!(users.len(), 2);
    assert_eq!(users[1].name, "jack");
}
