//! Maps each RPC method onto the [`Host`] trait
//!
//! Runs inside a tick on the host thread. Host errors become failed
//! outcomes; nothing here returns a transport-level fault.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::{Outcome, RpcCall, RpcReply};

use crate::error::HostResult;
use crate::traits::Host;

/// Execute one call against live host state
pub fn dispatch<H: Host>(call: RpcCall, host: &mut H) -> RpcReply {
    match call {
        RpcCall::Ping => RpcReply::Pong(true),
        RpcCall::CreateDocument { name } => outcome(host.create_document(&name).map(Outcome::document)),
        RpcCall::CreateObject {
            doc,
            type_id,
            name,
            properties,
        } => outcome(
            host.create_object(&doc, &type_id, &name, &properties)
                .map(Outcome::object),
        ),
        RpcCall::EditObject { doc, name, properties } => {
            outcome(host.edit_object(&doc, &name, &properties).map(Outcome::object))
        }
        RpcCall::DeleteObject { doc, name } => outcome(host.delete_object(&doc, &name).map(Outcome::object)),
        RpcCall::ExecuteCode { source } => outcome(host.execute_code(&source).map(|output| {
            Outcome::message(format!("Code executed successfully\nOutput: {}", output.trim_end()))
        })),
        RpcCall::GetObjects { doc } => reply(host.get_objects(&doc), RpcReply::Objects),
        RpcCall::GetObject { doc, name } => reply(host.get_object(&doc, &name), RpcReply::Object),
        RpcCall::ListDocuments => RpcReply::Documents(host.list_documents()),
        RpcCall::GetActiveScreenshot { view } => reply(host.screenshot(&view), |image| {
            RpcReply::Screenshot(image.map(|bytes| STANDARD.encode(bytes)))
        }),
        RpcCall::RecomputeDocument { doc } => outcome(
            host.recompute(&doc)
                .map(|count| Outcome::message(format!("Recomputed {count} objects in {doc}"))),
        ),
    }
}

fn outcome(result: HostResult<Outcome>) -> RpcReply {
    match result {
        Ok(outcome) => RpcReply::Outcome(outcome),
        Err(e) => RpcReply::failure(e.to_string()),
    }
}

fn reply<T>(result: HostResult<T>, wrap: impl FnOnce(T) -> RpcReply) -> RpcReply {
    match result {
        Ok(value) => wrap(value),
        Err(e) => RpcReply::failure(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::traits::MockHost;
    use mockall::predicate::eq;
    use serde_json::{json, Map};

    #[test]
    fn test_create_object_reports_object_name() {
        let mut host = MockHost::new();
        host.expect_create_object()
            .withf(|doc, type_id, name, properties| {
                doc == "Part" && type_id == "Part::Box" && name == "Foo" && properties["Length"] == json!(10)
            })
            .times(1)
            .returning(|_, _, name, _| Ok(name.to_string()));

        let reply = dispatch(
            RpcCall::CreateObject {
                doc: "Part".to_string(),
                type_id: "Part::Box".to_string(),
                name: "Foo".to_string(),
                properties: json!({"Length": 10}).as_object().cloned().unwrap(),
            },
            &mut host,
        );
        assert_eq!(reply, RpcReply::Outcome(Outcome::object("Foo")));
    }

    #[test]
    fn test_host_error_becomes_failed_outcome() {
        let mut host = MockHost::new();
        host.expect_edit_object().returning(|doc, _, _| {
            Err(HostError::DocumentNotFound { doc: doc.to_string() })
        });

        let reply = dispatch(
            RpcCall::EditObject {
                doc: "Nope".to_string(),
                name: "Foo".to_string(),
                properties: Map::new(),
            },
            &mut host,
        );
        assert_eq!(reply, RpcReply::failure("Document 'Nope' not found"));
    }

    #[test]
    fn test_execute_code_includes_output() {
        let mut host = MockHost::new();
        host.expect_execute_code()
            .with(eq("print(1 + 1)"))
            .returning(|_| Ok("2\n".to_string()));

        let reply = dispatch(RpcCall::ExecuteCode { source: "print(1 + 1)".to_string() }, &mut host);
        match reply {
            RpcReply::Outcome(outcome) => {
                assert!(outcome.success);
                assert!(outcome.message.unwrap().ends_with("Output: 2"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_screenshot_is_base64_or_null() {
        let mut host = MockHost::new();
        host.expect_screenshot()
            .with(eq("Isometric"))
            .returning(|_| Ok(Some(vec![0x89, b'P', b'N', b'G'])));
        host.expect_screenshot().with(eq("Top")).returning(|_| Ok(None));

        let shot = dispatch(RpcCall::GetActiveScreenshot { view: "Isometric".to_string() }, &mut host);
        assert_eq!(shot, RpcReply::Screenshot(Some("iVBORw==".to_string())));

        let none = dispatch(RpcCall::GetActiveScreenshot { view: "Top".to_string() }, &mut host);
        assert_eq!(none, RpcReply::Screenshot(None));
    }

    #[test]
    fn test_ping_never_touches_host() {
        let mut host = MockHost::new();
        assert_eq!(dispatch(RpcCall::Ping, &mut host), RpcReply::Pong(true));
    }
}
