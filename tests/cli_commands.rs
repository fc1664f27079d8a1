use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

fn command(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mmoney").expect("binary exists");
    cmd.env("MMONEY_CLI_CONFIG_DIR", temp.path())
        .env("MMONEY_CLI_DISABLE_KEYRING", "1")
        .env_remove("RUST_LOG");
    cmd
}

fn login_with_token(temp: &TempDir, token: &str) {
    command(temp)
        .args(["auth", "login", "--token", token])
        .assert()
        .success()
        .stdout(predicate::str::contains("Session saved to file"));
}

#[test]
fn auth_status_reports_missing_credentials() {
    let temp = TempDir::new().expect("temp dir");
    command(&temp)
        .args(["auth", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Not authenticated"));
}

#[test]
fn token_login_round_trips_through_the_session_file() {
    let temp = TempDir::new().expect("temp dir");
    login_with_token(&temp, "tok-round-trip");

    command(&temp)
        .args(["auth", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Authenticated (file:"));

    command(&temp)
        .args(["auth", "logout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Session deleted."));

    command(&temp)
        .args(["auth", "logout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No session found."));

    command(&temp)
        .args(["auth", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Not authenticated"));
}

#[test]
fn non_interactive_login_requires_email_and_password() {
    let temp = TempDir::new().expect("temp dir");
    command(&temp)
        .args(["auth", "login", "--no-interactive"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("VALIDATION_MISSING_FIELD"));
}

#[test]
fn blocked_mutation_exits_with_the_reserved_status() {
    let temp = TempDir::new().expect("temp dir");
    let server = MockServer::start();
    let graphql = server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200);
    });

    command(&temp)
        .args([
            "--base-url",
            &server.base_url(),
            "accounts",
            "delete",
            "acc-1",
            "--yes",
        ])
        .assert()
        .failure()
        .code(6)
        .stderr(predicate::str::contains("MUTATION_BLOCKED"))
        .stderr(predicate::str::contains("--allow-mutations"));

    assert_eq!(graphql.hits(), 0);
}

#[test]
fn permitted_mutation_invokes_the_service_once() {
    let temp = TempDir::new().expect("temp dir");
    login_with_token(&temp, "tok-mutate");
    let server = MockServer::start();
    let graphql = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .header("authorization", "Token tok-mutate")
            .body_contains("Web_SetTransactionTags");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "data": { "setTransactionTags": {
                    "transaction": { "id": "tx-1", "tags": [ { "id": "tag-1", "name": "Trips" } ] }
                } }
            }));
    });

    command(&temp)
        .args([
            "--base-url",
            &server.base_url(),
            "--allow-mutations",
            "tags",
            "set",
            "tx-1",
            "--tag-id",
            "tag-1",
            "--format",
            "json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("tag-1"));

    assert_eq!(graphql.hits(), 1);
}

#[test]
fn delete_without_confirmation_aborts() {
    let temp = TempDir::new().expect("temp dir");
    login_with_token(&temp, "tok-delete");
    let server = MockServer::start();
    let graphql = server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200);
    });

    command(&temp)
        .args([
            "--base-url",
            &server.base_url(),
            "--allow-mutations",
            "transactions",
            "delete",
            "tx-1",
        ])
        .write_stdin("n\n")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Aborted."));

    assert_eq!(graphql.hits(), 0);
}

#[test]
fn invalid_date_fails_before_any_request() {
    let temp = TempDir::new().expect("temp dir");
    login_with_token(&temp, "tok-dates");
    let server = MockServer::start();
    let graphql = server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(500);
    });

    command(&temp)
        .args([
            "--base-url",
            &server.base_url(),
            "transactions",
            "list",
            "--start-date",
            "2024-13-99",
        ])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("VALIDATION_INVALID_DATE"));

    assert_eq!(graphql.hits(), 0);
}

#[test]
fn unauthorized_response_maps_to_the_auth_status() {
    let temp = TempDir::new().expect("temp dir");
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(401).body("unauthorized");
    });

    command(&temp)
        .args(["--base-url", &server.base_url(), "accounts", "list"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("AUTH_REQUIRED"))
        .stderr(predicate::str::contains("auth login"));
}

#[test]
fn upstream_graphql_error_maps_to_status_5() {
    let temp = TempDir::new().expect("temp dir");
    login_with_token(&temp, "tok-upstream");
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "data": null,
                "errors": [ { "message": "Something went wrong" } ]
            }));
    });

    command(&temp)
        .args(["--base-url", &server.base_url(), "accounts", "list"])
        .assert()
        .failure()
        .code(5)
        .stderr(predicate::str::contains("API_ERROR"))
        .stderr(predicate::str::contains("Something went wrong"));
}

#[test]
fn session_token_is_attached_to_requests() {
    let temp = TempDir::new().expect("temp dir");
    login_with_token(&temp, "tok-e2e");
    let server = MockServer::start();
    let graphql = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .header("authorization", "Token tok-e2e")
            .body_contains("GetAccounts");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "data": { "accounts": [ { "id": "1", "displayName": "Checking" } ] }
            }));
    });

    command(&temp)
        .args([
            "--base-url",
            &server.base_url(),
            "accounts",
            "list",
            "--format",
            "jsonl",
        ])
        .assert()
        .success()
        .stdout("{\"id\":\"1\",\"displayName\":\"Checking\"}\n");

    assert_eq!(graphql.hits(), 1);
}

#[test]
fn csv_output_uses_the_sorted_union_of_columns() {
    let temp = TempDir::new().expect("temp dir");
    login_with_token(&temp, "tok-csv");
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "data": { "accounts": [
                    { "id": "1", "name": "Checking" },
                    { "id": "2", "balance": { "current": 3.5 } }
                ] }
            }));
    });

    command(&temp)
        .args([
            "--base-url",
            &server.base_url(),
            "accounts",
            "list",
            "--format",
            "csv",
        ])
        .assert()
        .success()
        .stdout("balance.current,id,name\n,1,Checking\n3.5,2,\n");
}

#[test]
fn text_is_the_default_format() {
    let temp = TempDir::new().expect("temp dir");
    login_with_token(&temp, "tok-text");
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "data": { "accounts": [
                    { "name": "Checking", "id": "1" },
                    { "id": "2" }
                ] }
            }));
    });

    command(&temp)
        .args(["--base-url", &server.base_url(), "accounts", "list"])
        .assert()
        .success()
        .stdout("id=1\nname=Checking\n---\nid=2\n");
}

#[test]
fn json_output_preserves_the_raw_envelope() {
    let temp = TempDir::new().expect("temp dir");
    login_with_token(&temp, "tok-json");
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "data": { "allTransactions": { "totalCount": 1, "results": [ { "id": "tx-1" } ] } }
            }));
    });

    command(&temp)
        .args([
            "--base-url",
            &server.base_url(),
            "transactions",
            "list",
            "--format",
            "json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"totalCount\": 1"))
        .stdout(predicate::str::contains("\"results\""));
}
