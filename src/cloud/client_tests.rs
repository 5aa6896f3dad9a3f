// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP-level tests for the CloudStack client against a wiremock server.

use super::*;
use crate::cloud::error::ErrorKind;
use serde_json::json;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(uri: &str) -> CloudConfig {
    CloudConfig {
        api_url: format!("{uri}/client/api"),
        api_key: "test-api-key".to_string(),
        secret_key: "test-secret-key".to_string(),
        verify_ssl: true,
    }
}

#[tokio::test]
async fn test_list_zones_parses_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("command", "listZones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "listzonesresponse": {
                "count": 1,
                "zone": [{"id": "z-1", "name": "zone1", "networktype": "Advanced"}]
            }
        })))
        .mount(&server)
        .await;

    let client = CloudStackClient::new(&test_config(&server.uri())).unwrap();
    let zones = client.list_zones(None, Some("zone1")).await.unwrap();
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0].id, "z-1");
    assert_eq!(zones[0].network_type.as_deref(), Some("Advanced"));
}

#[tokio::test]
async fn test_empty_list_response_yields_empty_vec() {
    let server = MockServer::start().await;
    // CloudStack omits the item key entirely when nothing matches.
    Mock::given(method("GET"))
        .and(query_param("command", "listZones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "listzonesresponse": {"count": 0}
        })))
        .mount(&server)
        .await;

    let client = CloudStackClient::new(&test_config(&server.uri())).unwrap();
    let zones = client.list_zones(None, Some("missing")).await.unwrap();
    assert!(zones.is_empty());
}

#[tokio::test]
async fn test_error_payload_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("command", "listVirtualMachines"))
        .respond_with(ResponseTemplate::new(431).set_body_json(json!({
            "errorresponse": {
                "errorcode": 431,
                "errortext": "no match found for vm i-missing"
            }
        })))
        .mount(&server)
        .await;

    let client = CloudStackClient::new(&test_config(&server.uri())).unwrap();
    let err = client
        .list_virtual_machines(Some("i-missing"), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_requests_carry_signature_and_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("command", "listZones"))
        .and(query_param("apiKey", "test-api-key"))
        .and(query_param("response", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "listzonesresponse": {"count": 0}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = CloudStackClient::new(&test_config(&server.uri())).unwrap();
    client.list_zones(None, None).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let query = requests[0].url.query().unwrap_or_default();
    assert!(query.contains("signature="), "signature missing: {query}");
}

#[tokio::test]
async fn test_async_job_is_polled_to_completion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("command", "destroyVirtualMachine"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "destroyvirtualmachineresponse": {"jobid": "job-77"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("command", "queryAsyncJobResult"))
        .and(query_param("jobid", "job-77"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "queryasyncjobresultresponse": {
                "jobstatus": 1,
                "jobresult": {"virtualmachine": {"id": "i-1", "name": "m-1"}}
            }
        })))
        .mount(&server)
        .await;

    let client = CloudStackClient::new(&test_config(&server.uri())).unwrap();
    client.destroy_virtual_machine("i-1", true).await.unwrap();
}

#[tokio::test]
async fn test_failed_async_job_surfaces_error_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("command", "deployVirtualMachine"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "deployvirtualmachineresponse": {"jobid": "job-13"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("command", "queryAsyncJobResult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "queryasyncjobresultresponse": {
                "jobstatus": 2,
                "jobresult": {"errortext": "Unable to deploy: zone z-1 does not exist"}
            }
        })))
        .mount(&server)
        .await;

    let client = CloudStackClient::new(&test_config(&server.uri())).unwrap();
    let err = client
        .deploy_virtual_machine(DeployVmParams {
            name: "m-1".to_string(),
            zone_id: "z-1".to_string(),
            network_id: "n-1".to_string(),
            service_offering_id: "so-1".to_string(),
            template_id: "t-1".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn test_signature_is_deterministic_and_sorted() {
    let config = CloudConfig {
        api_url: "https://acs/client/api".to_string(),
        api_key: "k".to_string(),
        secret_key: "s".to_string(),
        verify_ssl: true,
    };
    let client = CloudStackClient::new(&config).unwrap();
    let params_a = vec![
        ("command".to_string(), "listZones".to_string()),
        ("apiKey".to_string(), "k".to_string()),
    ];
    let params_b = vec![
        ("apiKey".to_string(), "k".to_string()),
        ("command".to_string(), "listZones".to_string()),
    ];
    // Parameter order must not influence the signature.
    assert_eq!(client.sign(&params_a), client.sign(&params_b));
}
