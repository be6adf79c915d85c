//! Action Endpoint Integration Tests
//!
//! Status codes and JSON bodies of the action dispatcher.

use hvp::api::{ActionRequest, AllowAll, Capability, Dispatcher, StaticAuthorizer};
use hvp::core::{library_scope, AuditLog, ContentStore, LibraryRegistry, Store, TokenService};
use hvp::domain::{ContentMetadata, EventType, LibraryId, NewContent, NewLibrary};
use serde_json::{json, Value};
use tempfile::TempDir;

struct Site {
    store: Store,
    tokens: TokenService,
    libraries: TempDir,
    from: LibraryId,
    to: LibraryId,
}

fn site() -> Site {
    let store = Store::open_in_memory().unwrap();
    let registry = LibraryRegistry::new(&store);
    let from = registry
        .register_library(&NewLibrary::new("H5P.Quiz", 1, 0, 0).runnable())
        .unwrap();
    let to = registry
        .register_library(&NewLibrary::new("H5P.Quiz", 1, 1, 0).runnable())
        .unwrap();

    Site {
        store,
        tokens: TokenService::new("site-secret"),
        libraries: TempDir::new().unwrap(),
        from,
        to,
    }
}

impl Site {
    fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::new(&self.store, &self.tokens, &AllowAll, self.libraries.path())
    }
}

#[test]
fn test_unknown_action_is_422() {
    let site = site();
    let response = site.dispatcher().handle(&ActionRequest::get("nosuchaction"));
    assert_eq!(response.status, 422);
    assert_eq!(response.body["success"], json!(false));
}

#[test]
fn test_restrict_library_round_trip() {
    let site = site();
    let dispatcher = site.dispatcher();
    let token = site.tokens.create_token(&library_scope(site.from));

    let response = dispatcher.handle(
        &ActionRequest::get("restrictlibrary")
            .param("library_id", site.from.to_string())
            .param("restrict", "1")
            .param("token", token),
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body["restricted"], json!(true));
    assert_eq!(response.body["next"]["restrict"], json!(0));

    let registry = LibraryRegistry::new(&site.store);
    assert!(registry.get(site.from).unwrap().restricted);

    // The returned token lifts the restriction again
    let next_token = response.body["next"]["token"].as_str().unwrap().to_string();
    let response = dispatcher.handle(
        &ActionRequest::get("restrictlibrary")
            .param("library_id", site.from.to_string())
            .param("restrict", "0")
            .param("token", next_token),
    );
    assert_eq!(response.status, 200);
    assert!(!registry.get(site.from).unwrap().restricted);

    let events = AuditLog::new(&site.store).recent(10).unwrap();
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|event| event.event_type == EventType::LibraryRestrict));
}

#[test]
fn test_any_nonzero_restrict_value_restricts() {
    let site = site();
    let response = site.dispatcher().handle(
        &ActionRequest::get("restrictlibrary")
            .param("library_id", site.from.to_string())
            .param("restrict", "2")
            .param("token", site.tokens.create_token(&library_scope(site.from))),
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body["restricted"], json!(true));
    assert!(LibraryRegistry::new(&site.store)
        .get(site.from)
        .unwrap()
        .restricted);
}

#[test]
fn test_restrict_with_token_for_other_library_is_401() {
    let site = site();
    let token = site.tokens.create_token(&library_scope(site.to));

    let response = site.dispatcher().handle(
        &ActionRequest::get("restrictlibrary")
            .param("library_id", site.from.to_string())
            .param("restrict", "1")
            .param("token", token),
    );
    assert_eq!(response.status, 401);
    assert!(!LibraryRegistry::new(&site.store)
        .get(site.from)
        .unwrap()
        .restricted);
}

#[test]
fn test_missing_capability_is_403() {
    let site = site();
    let viewer = StaticAuthorizer::new([Capability::ViewLibraries]);
    let dispatcher = Dispatcher::new(&site.store, &site.tokens, &viewer, site.libraries.path());

    let response = dispatcher.handle(
        &ActionRequest::get("restrictlibrary")
            .param("library_id", site.from.to_string())
            .param("restrict", "1")
            .param("token", site.tokens.create_token(&library_scope(site.from))),
    );
    assert_eq!(response.status, 403);

    let response = dispatcher.handle(&ActionRequest::get("libraries"));
    assert_eq!(response.status, 200);
}

#[test]
fn test_library_data_for_upgrade() {
    let site = site();
    let dispatcher = site.dispatcher();

    let response = dispatcher
        .handle(&ActionRequest::get("getlibrarydataforupgrade").param("library", "/H5P.Quiz/1/1"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["name"], json!("H5P.Quiz"));
    assert_eq!(response.body["version"], json!({"major": 1, "minor": 1}));
    assert!(response.body.get("upgradesScript").is_none());

    let malformed = dispatcher
        .handle(&ActionRequest::get("getlibrarydataforupgrade").param("library", "/H5P.Quiz/1"));
    assert_eq!(malformed.status, 422);

    let missing = dispatcher
        .handle(&ActionRequest::get("getlibrarydataforupgrade").param("library", "/H5P.Nope/1/0"));
    assert_eq!(missing.status, 404);
}

#[test]
fn test_upgrade_progress_requires_post() {
    let site = site();
    let response = site.dispatcher().handle(
        &ActionRequest::get("libraryupgradeprogress")
            .param("library_id", site.from.to_string())
            .param("libraryId", site.to.to_string())
            .param("token", site.tokens.create_token("contentupgrade")),
    );
    assert_eq!(response.status, 405);
}

#[test]
fn test_upgrade_progress_wire_format() {
    let site = site();
    let contents = ContentStore::new(&site.store);
    let a = contents
        .insert(
            &NewContent::new("Alpha", site.from, r#"{"n":1}"#).with_metadata(ContentMetadata {
                license: Some("CC BY".to_string()),
                ..ContentMetadata::default()
            }),
        )
        .unwrap();
    let b = contents
        .insert(&NewContent::new("Beta", site.from, r#"{"n":2}"#))
        .unwrap();
    let dispatcher = site.dispatcher();

    // First call: no params, get the first batch
    let response = dispatcher.handle(
        &ActionRequest::post("libraryupgradeprogress")
            .param("library_id", site.from.to_string())
            .param("libraryId", site.to.to_string())
            .param("token", site.tokens.create_token("contentupgrade")),
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body["left"], json!(2));
    assert_eq!(response.body["skipped"], json!([]));

    // Each entry is a JSON string holding both params and metadata
    let entry: Value =
        serde_json::from_str(response.body["params"][a.to_string()].as_str().unwrap()).unwrap();
    assert_eq!(entry["params"], json!({"n": 1}));
    assert_eq!(entry["metadata"]["license"], json!("CC BY"));
    let entry_b: Value =
        serde_json::from_str(response.body["params"][b.to_string()].as_str().unwrap()).unwrap();
    assert_eq!(entry_b["params"], json!({"n": 2}));
    assert!(entry_b["metadata"].is_object());

    // Second call: submit A upgraded, skip B
    let upgraded: Value = json!({
        a.to_string(): json!({"params": {"n": 10}, "metadata": {"license": "U"}}).to_string(),
    });
    let token = response.body["token"].as_str().unwrap().to_string();
    let response = dispatcher.handle(
        &ActionRequest::post("libraryupgradeprogress")
            .param("library_id", site.from.to_string())
            .param("libraryId", site.to.to_string())
            .param("token", token)
            .param("skipped", json!([b.get()]).to_string())
            .param("params", upgraded.to_string()),
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body["left"], json!(0));
    assert_eq!(response.body["skipped"], json!([b.get()]));
    assert_eq!(response.body["params"], json!({}));

    let alpha = contents.get(a).unwrap();
    assert_eq!(alpha.main_library_id, site.to);
    assert_eq!(alpha.json_content, r#"{"n":10}"#);
    assert_eq!(alpha.metadata.license.as_deref(), Some("U"));
    assert_eq!(contents.get(b).unwrap().main_library_id, site.from);
}

#[test]
fn test_upgrade_progress_entries_can_be_sent_back_unchanged() {
    let site = site();
    let contents = ContentStore::new(&site.store);
    let id = contents
        .insert(&NewContent::new("Alpha", site.from, r#"{"text":"hi"}"#))
        .unwrap();
    let dispatcher = site.dispatcher();

    let first = dispatcher.handle(
        &ActionRequest::post("libraryupgradeprogress")
            .param("library_id", site.from.to_string())
            .param("libraryId", site.to.to_string())
            .param("token", site.tokens.create_token("contentupgrade")),
    );
    assert_eq!(first.status, 200);

    let second = dispatcher.handle(
        &ActionRequest::post("libraryupgradeprogress")
            .param("library_id", site.from.to_string())
            .param("libraryId", site.to.to_string())
            .param("token", first.body["token"].as_str().unwrap())
            .param("params", first.body["params"].to_string()),
    );
    assert_eq!(second.status, 200);
    assert_eq!(second.body["left"], json!(0));
    assert_eq!(second.body["skipped"], json!([]));

    let content = contents.get(id).unwrap();
    assert_eq!(content.main_library_id, site.to);
    assert_eq!(content.json_content, r#"{"text":"hi"}"#);
}

#[test]
fn test_upgrade_progress_bad_token_and_missing_target() {
    let site = site();
    let dispatcher = site.dispatcher();

    let response = dispatcher.handle(
        &ActionRequest::post("libraryupgradeprogress")
            .param("library_id", site.from.to_string())
            .param("libraryId", site.to.to_string())
            .param("token", "wrong"),
    );
    assert_eq!(response.status, 401);

    let response = dispatcher.handle(
        &ActionRequest::post("libraryupgradeprogress")
            .param("library_id", site.from.to_string())
            .param("libraryId", "9999")
            .param("token", site.tokens.create_token("contentupgrade")),
    );
    assert_eq!(response.status, 404);

    let response = dispatcher.handle(
        &ActionRequest::post("libraryupgradeprogress")
            .param("library_id", site.from.to_string())
            .param("token", site.tokens.create_token("contentupgrade")),
    );
    assert_eq!(response.status, 422);
}

#[test]
fn test_libraries_overview_and_details() {
    let site = site();
    let dispatcher = site.dispatcher();

    let response = dispatcher.handle(&ActionRequest::get("libraries"));
    assert_eq!(response.status, 200);
    let rows = response.body.as_array().unwrap();
    assert_eq!(rows.len(), 2);

    let response = dispatcher.handle(
        &ActionRequest::get("libraries")
            .param("machineName", "H5P.Quiz")
            .param("majorVersion", "1")
            .param("minorVersion", "0"),
    );
    assert_eq!(response.status, 200);
    let candidates = response.body["upgradeCandidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0]["reachable"], json!(true));
    assert_eq!(response.body["latestVersion"]["id"], json!(site.to.get()));
}
