/// Integration tests with mocked vendor APIs
/// Exercises the real HTTP clients, pacing, breaker and the full waterfall against wiremock
use email_waterfall::batch::BatchRunner;
use email_waterfall::config::{Config, OriginalFallback, ProviderEndpoints};
use email_waterfall::credentials::CredentialSet;
use email_waterfall::enrichment::Waterfall;
use email_waterfall::errors::ProviderFailure;
use email_waterfall::models::{
    Contact, Deliverability, EmailSource, ProviderId, ProviderVerdict, Quality, Validity,
};
use email_waterfall::records::ContactTable;
use email_waterfall::registry::ProviderRegistry;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create test config pointing every vendor at the mock server
fn create_test_config(base_url: &str) -> Config {
    Config {
        request_timeout: Duration::from_secs(5),
        inter_call_delay: Duration::ZERO,
        contact_delay: Duration::ZERO,
        rate_limit_cooldown: Duration::from_millis(50),
        endpoints: ProviderEndpoints::all_at(base_url),
        ..Config::default()
    }
}

fn all_credentials() -> CredentialSet {
    CredentialSet::from_pairs([
        ("TRYKIT_API_KEY", "tk-key"),
        ("LEADMAGIC_API_KEY", "lm-key"),
        ("ICYPEAS_API_KEY", "ic-key"),
        ("MILLIONVERIFIER_API_KEY", "mv-key"),
        ("BOUNCEBAN_API_KEY", "bb-key"),
        ("EMAILGUARD_API_KEY", "eg-key"),
    ])
}

fn registry_for(config: &Config) -> ProviderRegistry {
    ProviderRegistry::from_credentials(&all_credentials(), config).unwrap()
}

#[tokio::test]
async fn test_millionverifier_quality() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/"))
        .and(query_param("api", "mv-key"))
        .and(query_param("email", "jane@acme.com"))
        .and(query_param("timeout", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "email": "jane@acme.com",
            "quality": "risky",
            "result": "catch_all"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let registry = registry_for(&create_test_config(&mock_server.uri()));
    let verdict = registry.check_quality("jane@acme.com").await;

    assert_eq!(verdict, ProviderVerdict::Quality(Quality::Risky));
}

#[tokio::test]
async fn test_trykit_finder_request_shape() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/job/find_email"))
        .and(query_param("src", "BuzzLead"))
        .and(header("x-api-key", "tk-key"))
        .and(body_json(json!({
            "fullName": "Jane Doe",
            "domain": "acme.com",
            "realtime": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "email": "jane@acme.com"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let registry = registry_for(&create_test_config(&mock_server.uri()));
    let verdict = registry
        .find_email(ProviderId::TryKit, "Jane Doe", "acme.com")
        .await;

    assert_eq!(verdict, ProviderVerdict::Email("jane@acme.com".to_string()));
}

#[tokio::test]
async fn test_leadmagic_and_icypeas_request_shapes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/business-email"))
        .and(header("X-API-Key", "lm-key"))
        .and(body_json(json!({ "name": "Jane Doe", "domain": "acme.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "email": null })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/email-search"))
        .and(header("Authorization", "Bearer ic-key"))
        .and(body_json(json!({ "full_name": "Jane Doe", "domain_name": "acme.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "email": "jdoe@acme.com"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let registry = registry_for(&create_test_config(&mock_server.uri()));

    assert_eq!(
        registry
            .find_email(ProviderId::LeadMagic, "Jane Doe", "acme.com")
            .await,
        ProviderVerdict::no_match()
    );
    assert_eq!(
        registry
            .find_email(ProviderId::Icypeas, "Jane Doe", "acme.com")
            .await,
        ProviderVerdict::Email("jdoe@acme.com".to_string())
    );
}

#[tokio::test]
async fn test_trykit_validity_and_bounceban_result() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/job/verify_email"))
        .and(header("x-api-key", "tk-key"))
        .and(body_json(json!({ "email": "j@acme.com", "realtime": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "validity": "valid-risky"
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/verify/single"))
        .and(query_param("email", "j@acme.com"))
        .and(header("Authorization", "bb-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "deliverable"
        })))
        .mount(&mock_server)
        .await;

    let registry = registry_for(&create_test_config(&mock_server.uri()));

    assert_eq!(
        registry.check_validity("j@acme.com").await,
        ProviderVerdict::Validity(Validity::ValidRisky)
    );
    assert_eq!(
        registry.check_deliverability("j@acme.com").await,
        ProviderVerdict::Deliverability(Deliverability::Deliverable)
    );
}

#[tokio::test]
async fn test_not_found_is_no_match() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/business-email"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Email not found"
        })))
        .mount(&mock_server)
        .await;

    let registry = registry_for(&create_test_config(&mock_server.uri()));
    let verdict = registry
        .find_email(ProviderId::LeadMagic, "Jane Doe", "acme.com")
        .await;

    assert_eq!(verdict, ProviderVerdict::no_match());
}

#[tokio::test]
async fn test_rate_limit_retried_once_then_succeeds() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v3/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "quality": "good" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let registry = registry_for(&create_test_config(&mock_server.uri()));
    let started = std::time::Instant::now();
    let verdict = registry.check_quality("jane@acme.com").await;

    assert_eq!(verdict, ProviderVerdict::Quality(Quality::Good));
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn test_second_rate_limit_is_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&mock_server)
        .await;

    let registry = registry_for(&create_test_config(&mock_server.uri()));
    let verdict = registry.check_quality("jane@acme.com").await;

    assert!(matches!(
        verdict,
        ProviderVerdict::Failure(ProviderFailure::RateLimited(_))
    ));
}

#[tokio::test]
async fn test_auth_and_malformed_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/verify/single"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/job/verify_email"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let registry = registry_for(&create_test_config(&mock_server.uri()));

    assert!(matches!(
        registry.check_deliverability("j@acme.com").await,
        ProviderVerdict::Failure(ProviderFailure::Auth(_))
    ));
    assert!(matches!(
        registry.check_validity("j@acme.com").await,
        ProviderVerdict::Failure(ProviderFailure::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn test_circuit_opens_after_consecutive_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/email-search"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = Config {
        circuit_breaker_threshold: 2,
        ..create_test_config(&mock_server.uri())
    };
    let registry = registry_for(&config);

    for _ in 0..2 {
        assert!(matches!(
            registry
                .find_email(ProviderId::Icypeas, "Jane Doe", "acme.com")
                .await,
            ProviderVerdict::Failure(ProviderFailure::Transport(_))
        ));
    }

    let verdict = registry
        .find_email(ProviderId::Icypeas, "Jane Doe", "acme.com")
        .await;
    assert!(matches!(
        verdict,
        ProviderVerdict::Failure(ProviderFailure::NoCandidate(_))
    ));
}

#[tokio::test]
async fn test_emailguard_host_cached_per_domain() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/email-host-lookup"))
        .and(header("Authorization", "Bearer eg-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "email_host": "Microsoft" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let registry = registry_for(&create_test_config(&mock_server.uri()));

    assert_eq!(
        registry.resolve_host("jane@acme.com").await,
        ProviderVerdict::Host("Microsoft".to_string())
    );
    assert_eq!(
        registry.resolve_host("john@ACME.com").await,
        ProviderVerdict::Host("Microsoft".to_string())
    );
}

#[tokio::test]
async fn test_emailguard_without_host_is_malformed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/email-host-lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": null })))
        .mount(&mock_server)
        .await;

    let registry = registry_for(&create_test_config(&mock_server.uri()));

    assert!(matches!(
        registry.resolve_host("jane@acme.com").await,
        ProviderVerdict::Failure(ProviderFailure::MalformedResponse(_))
    ));
}

/// Mounts the vendor responses for the "bad original, second finder hits" run.
async fn mount_full_waterfall(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v3/"))
        .and(query_param("email", "jane@acme.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "quality": "bad" })))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v3/"))
        // Found addresses are validated as returned; only the confirmed one is lower-cased
        .and(query_param("email", "Jane.Doe@acme.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "quality": "good" })))
        .mount(mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/job/find_email"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "email": "" })))
        .mount(mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/business-email"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "email": "Jane.Doe@acme.com"
        })))
        .mount(mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/email-host-lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "email_host": "Google" }
        })))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_full_waterfall_against_mocked_vendors() {
    let mock_server = MockServer::start().await;
    mount_full_waterfall(&mock_server).await;

    // Icypeas must never be reached once LeadMagic has a match
    Mock::given(method("POST"))
        .and(path("/api/email-search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "email": "x@acme.com" })))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let waterfall = Waterfall::new(Arc::new(registry_for(&config)), OriginalFallback::Discard);

    let contact = Contact::new("Jane Doe", "acme.com", "Acme, Inc.").with_email("jane@acme.com");
    let outcome = waterfall.enrich(&contact).await;

    assert_eq!(outcome.original_quality, Some(Quality::Bad));
    assert_eq!(outcome.found_email.as_deref(), Some("Jane.Doe@acme.com"));
    assert_eq!(
        outcome.email_source,
        Some(EmailSource::Provider(ProviderId::LeadMagic))
    );
    assert_eq!(outcome.valid_email.as_deref(), Some("jane.doe@acme.com"));
    assert_eq!(outcome.esp_host.as_deref(), Some("Google"));
}

#[tokio::test]
async fn test_csv_run_writes_enriched_columns() {
    let mock_server = MockServer::start().await;
    mount_full_waterfall(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/api/email-search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "email": null })))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let waterfall = Arc::new(Waterfall::new(
        Arc::new(registry_for(&config)),
        OriginalFallback::Discard,
    ));

    let input = "Full Name,Website,Company,Email\n\
                 Jane Doe,https://acme.com,\"Acme, Inc.\",jane@acme.com\n";
    let table = ContactTable::from_reader(input.as_bytes()).unwrap();
    let runner = BatchRunner::new(waterfall, config.contact_delay, 1);
    let report = runner.run(table.contacts()).await;

    let mut out = Vec::new();
    table.write_enriched(&mut out, &report.outcomes).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[1],
        "Jane Doe,https://acme.com,\"Acme, Inc.\",jane@acme.com,Jane,Acme,jane.doe@acme.com,Google,leadmagic,good,"
    );
    assert_eq!(report.summary.enriched, 1);
}
