//! Integration tests for the HTTP session using wiremock
//!
//! These tests drive resources and proxies through a real `HttpSession`
//! against mocked endpoints, checking headers, status handling and
//! pagination on the wire.

use serde_json::{json, Map};
use stacksdk::config::CloudConfig;
use stacksdk::resource::{Resource, ResourceType};
use stacksdk::services::baremetal::{Node, ProvisionRequest};
use stacksdk::services::block_storage::Volume;
use stacksdk::session::http::HttpSession;
use stacksdk::{CloudClient, Error};
use std::collections::BTreeMap;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cloud_for(server: &MockServer) -> CloudConfig {
    let mut endpoints = BTreeMap::new();
    endpoints.insert("baremetal".to_string(), server.uri());
    endpoints.insert("volume".to_string(), format!("{}/v3/p1", server.uri()));
    CloudConfig {
        token: Some("test-token".to_string()),
        project_id: Some("p1".to_string()),
        retry_delay: 0,
        endpoints,
        ..Default::default()
    }
}

fn client_for(server: &MockServer) -> CloudClient {
    CloudClient::new(cloud_for(server)).expect("client")
}

mod session_tests {
    use super::*;

    /// Token, microversion and request id headers are sent on every call
    #[tokio::test]
    async fn test_fetch_sends_auth_and_microversion_headers() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/nodes/n1"))
            .and(header("X-Auth-Token", "test-token"))
            .and(header("OpenStack-API-Version", "baremetal 1.52"))
            .and(header("Accept", "application/json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"uuid": "n1", "provision_state": "active", "maintenance": false})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let node = client_for(&server).baremetal().get_node("n1").await.unwrap();
        assert_eq!(node.provision_state().as_deref(), Some("active"));
        assert!(!node.is_maintenance());

        let received = server.received_requests().await.unwrap();
        let request_id = received[0]
            .headers
            .get("X-OpenStack-Request-ID")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(request_id.starts_with("req-"));
    }

    /// 404 becomes ResourceNotFound carrying the server's message
    #[tokio::test]
    async fn test_not_found_is_translated() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v3/p1/volumes/missing"))
            .respond_with(
                ResponseTemplate::new(404)
                    .insert_header("x-openstack-request-id", "req-abc")
                    .set_body_json(json!({"itemNotFound": {"message": "Volume missing could not be found.", "code": 404}})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .block_storage()
            .get_volume("missing")
            .await
            .unwrap_err();

        match err {
            Error::ResourceNotFound { details: Some(details), .. } => {
                assert_eq!(details.status, 404);
                assert_eq!(details.message, "Volume missing could not be found.");
                assert_eq!(details.request_id.as_deref(), Some("req-abc"));
            },
            other => panic!("unexpected error: {:?}", other),
        }
    }

    /// Conflicts are retried for services that declare 409 retriable
    #[tokio::test]
    async fn test_conflict_is_retried() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/nodes/n1/states/power"))
            .respond_with(ResponseTemplate::new(409).set_body_string("Node n1 is locked"))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/nodes/n1/states/power"))
            .and(body_json(json!({"target": "power off"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .baremetal()
            .set_node_power_state("n1", "power off", false, None)
            .await
            .unwrap();

        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    /// Without retries configured for a status, the error surfaces at once
    #[tokio::test]
    async fn test_server_error_is_not_retried_for_volumes() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/v3/p1/volumes/v1"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({"conflictingRequest": {"message": "Volume is in use"}})))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .block_storage()
            .delete_volume("v1", false)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(409));
        assert_eq!(err.http_details().unwrap().message, "Volume is in use");
    }

    /// Missing endpoints are reported before any request
    #[tokio::test]
    async fn test_missing_endpoint_is_a_config_error() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .load_balancer()
            .get_load_balancer("lb1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}

mod resource_tests {
    use super::*;

    /// Listing follows markers until a short page
    #[tokio::test]
    async fn test_list_paginates_with_markers() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v3/p1/volumes"))
            .and(query_param("marker", "v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"volumes": [{"id": "v3"}]})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v3/p1/volumes"))
            .and(query_param("limit", "2"))
            .and(query_param("status", "available"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"volumes": [{"id": "v1"}, {"id": "v2"}]})))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let session = Arc::new(HttpSession::new(&cloud_for(&server)).unwrap());
        let mut params = BTreeMap::new();
        params.insert("limit".to_string(), json!(2));
        params.insert("status".to_string(), json!("available"));

        let volumes = Resource::list_all(session, Volume::schema(), params).await.unwrap();
        let ids: Vec<String> = volumes.iter().filter_map(|v| v.id()).collect();
        assert_eq!(ids, vec!["v1", "v2", "v3"]);
    }

    /// Node updates go out as JSON patch documents
    #[tokio::test]
    async fn test_node_update_sends_json_patch() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/nodes/n1"))
            .and(body_json(json!([{"op": "add", "path": "/extra", "value": {"rack": "r12"}}])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "n1", "extra": {"rack": "r12"}})))
            .expect(1)
            .mount(&server)
            .await;

        let mut attrs = Map::new();
        attrs.insert("extra".to_string(), json!({"rack": "r12"}));
        let node = client_for(&server).baremetal().update_node("n1", attrs).await.unwrap();
        assert_eq!(node.get("extra"), json!({"rack": "r12"}));
        assert!(!node.is_dirty());
    }

    /// Provision actions are followed by a refresh of the node
    #[tokio::test]
    async fn test_provision_action_refreshes_node() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/nodes/n1/states/provision"))
            .and(body_json(json!({"target": "manage"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/nodes/n1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "n1", "provision_state": "verifying"})))
            .mount(&server)
            .await;

        let node: Node = client_for(&server)
            .baremetal()
            .set_node_provision_state("n1", ProvisionRequest::new("manage"), false, None)
            .await
            .unwrap();
        assert_eq!(node.provision_state().as_deref(), Some("verifying"));
    }

    /// A missing resource is tolerated when asked to
    #[tokio::test]
    async fn test_delete_ignores_missing() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/nodes/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let deleted = client_for(&server).baremetal().delete_node("gone", true).await.unwrap();
        assert!(deleted.is_none());
    }
}
