//! Action endpoints.
//!
//! Each request names an `action` and carries string parameters, the way a
//! form post or query string would. The dispatcher checks the caller's
//! capability, validates tokens through the core and maps every error to a
//! JSON body plus HTTP status.

pub mod auth;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::{
    library_overview, library_scope, library_upgrade_info, AdvanceRequest, AuditLog, CoreError,
    DependencyResolver, LibraryRegistry, Store, TokenService, UpgradeCoordinator,
    UpgradedContent, DEFAULT_BATCH_SIZE,
};
use crate::domain::{AuditEvent, ContentId, ContentMetadata, EventType, LibraryId, LibraryKey};

pub use auth::{AllowAll, Authorizer, Capability, StaticAuthorizer};

/// HTTP method of an action request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One action call
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action: String,
    pub method: Method,
    pub params: HashMap<String, String>,
    pub user_id: i64,
}

impl ActionRequest {
    pub fn get(action: impl Into<String>) -> Self {
        Self::new(action, Method::Get)
    }

    pub fn post(action: impl Into<String>) -> Self {
        Self::new(action, Method::Post)
    }

    fn new(action: impl Into<String>, method: Method) -> Self {
        Self {
            action: action.into(),
            method,
            params: HashMap::new(),
            user_id: 0,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn as_user(mut self, user_id: i64) -> Self {
        self.user_id = user_id;
        self
    }

    fn required(&self, name: &str) -> Result<&str, CoreError> {
        self.params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| CoreError::Validation(format!("Missing parameter '{}'", name)))
    }

    fn optional(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    fn required_int(&self, name: &str) -> Result<i64, CoreError> {
        let raw = self.required(name)?;
        raw.trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("Parameter '{}' is not an integer", name)))
    }
}

/// JSON response with HTTP status
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResponse {
    pub status: u16,
    pub body: Value,
}

impl ActionResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "success": false, "message": message.into() }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures at the action boundary
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Action '{0}' only accepts POST")]
    MethodNotAllowed(String),

    #[error("Unknown action '{0}'")]
    UnknownAction(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Core(err) => err.status_code(),
            ApiError::MethodNotAllowed(_) => 405,
            ApiError::UnknownAction(_) => 422,
        }
    }
}

/// One upgraded entry of the `params` map: `{"params": .., "metadata": ..}`
#[derive(Debug, Deserialize)]
struct UpgradedEntry {
    params: Value,
    #[serde(default)]
    metadata: Option<ContentMetadata>,
}

/// Routes action requests to core operations
pub struct Dispatcher<'a> {
    store: &'a Store,
    tokens: &'a TokenService,
    authorizer: &'a dyn Authorizer,
    libraries_dir: PathBuf,
    batch_size: usize,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        store: &'a Store,
        tokens: &'a TokenService,
        authorizer: &'a dyn Authorizer,
        libraries_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            tokens,
            authorizer,
            libraries_dir: libraries_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Handle a request, turning every error into a JSON error response
    pub fn handle(&self, request: &ActionRequest) -> ActionResponse {
        debug!(action = %request.action, user_id = request.user_id, "Handling action");
        match self.dispatch(request) {
            Ok(body) => ActionResponse::ok(body),
            Err(err) => {
                let status = err.status_code();
                if status >= 500 {
                    warn!(action = %request.action, error = %err, "Action failed");
                }
                ActionResponse::error(status, err.to_string())
            }
        }
    }

    fn dispatch(&self, request: &ActionRequest) -> Result<Value, ApiError> {
        match request.action.as_str() {
            "restrictlibrary" => {
                self.require(request, Capability::RestrictLibraries)?;
                Ok(self.restrict_library(request)?)
            }
            "getlibrarydataforupgrade" => {
                self.require(request, Capability::UpdateLibraries)?;
                Ok(self.library_data_for_upgrade(request)?)
            }
            "libraryupgradeprogress" => {
                self.require(request, Capability::UpdateLibraries)?;
                if request.method != Method::Post {
                    return Err(ApiError::MethodNotAllowed(request.action.clone()));
                }
                Ok(self.upgrade_progress(request)?)
            }
            "libraries" => {
                self.require(request, Capability::ViewLibraries)?;
                Ok(self.libraries(request)?)
            }
            other => Err(ApiError::UnknownAction(other.to_string())),
        }
    }

    fn require(&self, request: &ActionRequest, capability: Capability) -> Result<(), CoreError> {
        if self.authorizer.has_capability(request.user_id, capability) {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied(format!(
                "missing capability '{}'",
                capability
            )))
        }
    }

    /// `library_id`, `restrict` (0 or 1), `token` scoped to the library
    fn restrict_library(&self, request: &ActionRequest) -> Result<Value, CoreError> {
        let library_id = LibraryId(request.required_int("library_id")?);
        let restrict = request.required_int("restrict")? != 0;

        let scope = library_scope(library_id);
        self.tokens.require(&scope, request.required("token")?)?;

        let registry = LibraryRegistry::new(self.store);
        registry.set_restricted(library_id, restrict)?;

        let library = registry.get(library_id)?;
        AuditLog::new(self.store).record(
            &AuditEvent::new(request.user_id, EventType::LibraryRestrict).with_library(&library),
        )?;

        // Parameters for toggling back
        Ok(json!({
            "restricted": restrict,
            "next": {
                "action": "restrictlibrary",
                "library_id": library_id,
                "restrict": if restrict { 0 } else { 1 },
                "token": self.tokens.create_token(&scope),
            }
        }))
    }

    /// `library` as `/<machine-name>/<major>/<minor>`
    fn library_data_for_upgrade(&self, request: &ActionRequest) -> Result<Value, CoreError> {
        let key = LibraryKey::parse_path(request.required("library")?)?;
        let info = library_upgrade_info(self.store, &key, &self.libraries_dir, request.user_id)?;
        Ok(serde_json::to_value(info)?)
    }

    /// `library_id` (source), `libraryId` (target), `token`, optional
    /// `skipped` (JSON array) and `params` (JSON object of id -> JSON string)
    fn upgrade_progress(&self, request: &ActionRequest) -> Result<Value, CoreError> {
        let from = LibraryId(request.required_int("library_id")?);
        let to = LibraryId(request.required_int("libraryId")?);
        let token = request.required("token")?.to_string();

        let mut skipped = match request.optional("skipped") {
            Some(raw) => parse_skipped(raw)?,
            None => Vec::new(),
        };

        let updated = match request.optional("params") {
            Some(raw) => parse_upgraded_params(raw, &mut skipped)?,
            None => Vec::new(),
        };

        let coordinator = UpgradeCoordinator::new(self.store, self.tokens, request.user_id)
            .with_batch_size(self.batch_size);
        let progress = coordinator.advance(AdvanceRequest {
            token,
            from,
            to,
            skipped,
            updated,
        })?;

        // Same `{"params", "metadata"}` string per id that the next call sends back
        let mut params = BTreeMap::new();
        for content in progress.next_batch {
            let stored: Value = serde_json::from_str(&content.params)?;
            let entry = json!({ "params": stored, "metadata": content.metadata });
            params.insert(content.id.to_string(), Value::String(entry.to_string()));
        }

        Ok(json!({
            "params": params,
            "token": progress.token,
            "skipped": progress.skipped,
            "left": progress.remaining,
        }))
    }

    /// Without arguments: overview of all libraries. With `machineName`,
    /// `majorVersion` and `minorVersion`: details of one library.
    fn libraries(&self, request: &ActionRequest) -> Result<Value, CoreError> {
        let Some(machine_name) = request.optional("machineName") else {
            return Ok(serde_json::to_value(library_overview(self.store)?)?);
        };

        let key = LibraryKey::new(
            machine_name,
            version_param(request, "majorVersion")?,
            version_param(request, "minorVersion")?,
        );

        let registry = LibraryRegistry::new(self.store);
        let library = registry
            .find_by_key(&key)?
            .ok_or_else(|| CoreError::not_found("Library", &key))?;
        let candidates = DependencyResolver::new(&registry).list_upgrade_candidates(library.id)?;
        let latest = registry.latest_runnable(&library.key.machine_name)?;
        let dependencies = registry.dependencies_of(library.id)?;
        let languages: Vec<String> = registry
            .translations_of(library.id)?
            .into_iter()
            .map(|(code, _)| code)
            .collect();

        Ok(json!({
            "library": library,
            "dependencies": dependencies,
            "languages": languages,
            "upgradeCandidates": candidates,
            "latestVersion": latest,
        }))
    }
}

fn version_param(request: &ActionRequest, name: &str) -> Result<u32, CoreError> {
    let value = request.required_int(name)?;
    u32::try_from(value)
        .map_err(|_| CoreError::Validation(format!("Parameter '{}' is out of range", name)))
}

/// Skip list as a JSON array of ids (numbers or numeric strings)
fn parse_skipped(raw: &str) -> Result<Vec<ContentId>, CoreError> {
    let values: Vec<Value> = serde_json::from_str(raw)
        .map_err(|e| CoreError::Validation(format!("Invalid skipped list: {}", e)))?;

    values
        .iter()
        .map(|value| match value {
            Value::Number(n) => n.as_i64().map(ContentId),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .map(|id| {
            id.ok_or_else(|| CoreError::Validation("Skipped ids must be integers".to_string()))
        })
        .collect()
}

/// Decode the `params` map. Entries that cannot be decoded are skipped
/// instead of failing the whole batch.
fn parse_upgraded_params(
    raw: &str,
    skipped: &mut Vec<ContentId>,
) -> Result<Vec<UpgradedContent>, CoreError> {
    let entries: BTreeMap<String, Value> = serde_json::from_str(raw)
        .map_err(|e| CoreError::Validation(format!("Invalid params map: {}", e)))?;

    let mut updated = Vec::with_capacity(entries.len());
    for (id, entry) in entries {
        let Ok(content_id) = id.parse::<ContentId>() else {
            warn!(key = %id, "Ignoring upgraded params with a non-numeric content id");
            continue;
        };

        let decoded = match entry {
            Value::String(inner) => serde_json::from_str::<UpgradedEntry>(&inner),
            other => serde_json::from_value::<UpgradedEntry>(other),
        };

        match decoded {
            Ok(entry) => updated.push(UpgradedContent {
                content_id,
                params: entry.params.to_string(),
                metadata: entry.metadata,
            }),
            Err(err) => {
                warn!(content_id = %content_id, error = %err, "Skipping malformed upgraded params");
                if !skipped.contains(&content_id) {
                    skipped.push(content_id);
                }
            }
        }
    }
    Ok(updated)
}
