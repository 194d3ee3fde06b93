//! Nova compute client against a mocked identity and compute API.

use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stratus_cloud_config::{AuthSection, CloudProfile};
use stratus_hibernate::openstack::{ComputeClient, ComputeError, NovaComputeClient};

fn client_for(server: &MockServer) -> NovaComputeClient {
    let profile = CloudProfile {
        auth: Some(AuthSection {
            auth_url: Some(format!("{}/identity/v3", server.uri())),
            username: Some("svc".to_string()),
            password: Some("hunter2".to_string()),
            user_domain_name: Some("Default".to_string()),
            project_name: Some("infra".to_string()),
            project_domain_name: Some("Default".to_string()),
            ..AuthSection::default()
        }),
        region_name: Some("region-1".to_string()),
        ..CloudProfile::default()
    };
    let auth = profile.validated_auth("test-cloud").unwrap();
    NovaComputeClient::new(auth, &profile).unwrap()
}

fn token_response(server_uri: &str) -> serde_json::Value {
    json!({
        "token": {
            "expires_at": "2026-08-26T12:00:00Z",
            "catalog": [
                {
                    "type": "identity",
                    "endpoints": [
                        {
                            "interface": "public",
                            "region": "region-1",
                            "url": format!("{server_uri}/identity/v3")
                        }
                    ]
                },
                {
                    "type": "compute",
                    "endpoints": [
                        {
                            "interface": "internal",
                            "region": "region-1",
                            "url": format!("{server_uri}/compute-internal/v2.1")
                        },
                        {
                            "interface": "public",
                            "region": "region-2",
                            "url": format!("{server_uri}/compute-r2/v2.1")
                        },
                        {
                            "interface": "public",
                            "region": "region-1",
                            "url": format!("{server_uri}/compute/v2.1")
                        }
                    ]
                }
            ]
        }
    })
}

/// Mount the token endpoint. The body matcher pins the password auth
/// shape so a malformed request fails to match and the test fails.
async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/identity/v3/auth/tokens"))
        .and(body_partial_json(json!({
            "auth": {
                "identity": { "methods": ["password"] },
                "scope": { "project": { "name": "infra" } }
            }
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-subject-token", "tok-123")
                .set_body_json(token_response(&server.uri())),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn lists_servers_across_pages() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    // Follow-up pages come from the servers_links href verbatim; only
    // the first request carries the name filter.
    let page2 = format!("{}/compute/v2.1/servers/detail?marker=srv-2", server.uri());
    Mock::given(method("GET"))
        .and(path("/compute/v2.1/servers/detail"))
        .and(query_param("name", "infra-x"))
        .and(header("x-auth-token", "tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "servers": [
                {
                    "id": "srv-1",
                    "name": "infra-x-master-0",
                    "status": "ACTIVE",
                    "OS-EXT-STS:task_state": null,
                    "hostId": "host-a"
                },
                {
                    "id": "srv-2",
                    "name": "infra-x-worker-0",
                    "status": "SHUTOFF",
                    "OS-EXT-STS:task_state": "powering-on"
                }
            ],
            "servers_links": [ { "rel": "next", "href": page2 } ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/compute/v2.1/servers/detail"))
        .and(query_param("marker", "srv-2"))
        .and(header("x-auth-token", "tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "servers": [
                { "id": "srv-3", "name": "infra-x-worker-1", "status": "ACTIVE" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let records = client.list_servers("infra-x").await.unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].id, "srv-1");
    assert_eq!(records[0].host_id.as_deref(), Some("host-a"));
    assert_eq!(records[1].task_state.as_deref(), Some("powering-on"));
    assert!(records[2].task_state.is_none());
    assert_eq!(records[2].name, "infra-x-worker-1");
}

#[tokio::test]
async fn power_actions_post_the_expected_bodies() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/compute/v2.1/servers/srv-9/action"))
        .and(header("x-auth-token", "tok-123"))
        .and(body_json(json!({ "os-stop": null })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/compute/v2.1/servers/srv-10/action"))
        .and(header("x-auth-token", "tok-123"))
        .and(body_json(json!({ "os-start": null })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.stop_server("srv-9").await.unwrap();
    client.start_server("srv-10").await.unwrap();
}

#[tokio::test]
async fn token_is_requested_once_per_client() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/compute/v2.1/servers/detail"))
        .and(query_param("name", "infra-x"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "servers": [] })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.list_servers("infra-x").await.unwrap();
    client.list_servers("infra-x").await.unwrap();
}

#[tokio::test]
async fn api_errors_carry_status_and_body() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/compute/v2.1/servers/srv-1/action"))
        .respond_with(ResponseTemplate::new(409).set_body_string("instance locked"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.stop_server("srv-1").await.unwrap_err();

    match err {
        ComputeError::Api { status, message } => {
            assert_eq!(status, 409);
            assert!(message.contains("instance locked"));
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_credentials_surface_as_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/identity/v3/auth/tokens"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid user"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.list_servers("infra-x").await.unwrap_err();

    match err {
        ComputeError::Auth(message) => assert!(message.contains("invalid user")),
        other => panic!("expected auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_compute_endpoint_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/identity/v3/auth/tokens"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-subject-token", "tok-123")
                .set_body_json(json!({
                    "token": {
                        "catalog": [
                            {
                                "type": "identity",
                                "endpoints": [
                                    {
                                        "interface": "public",
                                        "region": "region-1",
                                        "url": format!("{}/identity/v3", server.uri())
                                    }
                                ]
                            }
                        ]
                    }
                })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.list_servers("infra-x").await.unwrap_err();

    match err {
        ComputeError::MissingEndpoint { region, interface } => {
            assert_eq!(region, "region-1");
            assert_eq!(interface, "public");
        }
        other => panic!("expected missing endpoint, got {other:?}"),
    }
}

#[tokio::test]
async fn application_credentials_authenticate_without_scope() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/identity/v3/auth/tokens"))
        .and(body_json(json!({
            "auth": {
                "identity": {
                    "methods": ["application_credential"],
                    "application_credential": { "id": "cred-1", "secret": "s3cret" }
                }
            }
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-subject-token", "tok-456")
                .set_body_json(token_response(&server.uri())),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/compute/v2.1/servers/detail"))
        .and(header("x-auth-token", "tok-456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "servers": [] })))
        .mount(&server)
        .await;

    let profile = CloudProfile {
        auth: Some(AuthSection {
            auth_url: Some(format!("{}/identity/v3", server.uri())),
            application_credential_id: Some("cred-1".to_string()),
            application_credential_secret: Some("s3cret".to_string()),
            ..AuthSection::default()
        }),
        region_name: Some("region-1".to_string()),
        auth_type: Some("v3applicationcredential".to_string()),
        ..CloudProfile::default()
    };
    let auth = profile.validated_auth("test-cloud").unwrap();
    let client = NovaComputeClient::new(auth, &profile).unwrap();

    let records = client.list_servers("infra-x").await.unwrap();
    assert!(records.is_empty());
}
