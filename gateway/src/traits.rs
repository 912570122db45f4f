//! Trait definitions with mockall annotations for testing
//!
//! [`Host`] is the boundary to the application being automated. Its methods
//! run only on the host thread, inside a tick, so it is synchronous and
//! takes `&mut self` for mutations.

use serde_json::{Map, Value};
use shared::ObjectPayload;

use crate::error::HostResult;

/// Live host state, touched from exactly one thread
#[mockall::automock]
pub trait Host: Send + 'static {
    /// Create a document, returning its (possibly uniquified) name
    fn create_document(&mut self, name: &str) -> HostResult<String>;

    /// Create an object of `type_id`, returning the name it was given
    fn create_object(
        &mut self,
        doc: &str,
        type_id: &str,
        name: &str,
        properties: &Map<String, Value>,
    ) -> HostResult<String>;

    /// Apply `properties` to an existing object; all or nothing
    fn edit_object(&mut self, doc: &str, name: &str, properties: &Map<String, Value>) -> HostResult<String>;

    fn delete_object(&mut self, doc: &str, name: &str) -> HostResult<String>;

    /// Run host-side code, returning its captured output
    fn execute_code(&mut self, source: &str) -> HostResult<String>;

    fn get_objects(&self, doc: &str) -> HostResult<Vec<ObjectPayload>>;

    /// `Ok(None)` when the document exists but the object does not
    fn get_object(&self, doc: &str, name: &str) -> HostResult<Option<ObjectPayload>>;

    fn list_documents(&self) -> Vec<String>;

    /// PNG bytes of `view` in the active document, `None` when unavailable
    fn screenshot(&self, view: &str) -> HostResult<Option<Vec<u8>>>;

    /// Recompute a document, returning how many objects were touched
    fn recompute(&mut self, doc: &str) -> HostResult<usize>;
}
