//! In-memory reference host
//!
//! [`DocumentHost`] keeps documents of typed objects, validates property
//! edits through the setter table and runs `execute_code` through the
//! script interpreter. It stands in for the real application behind the
//! [`Host`] boundary and is what the `gateway` binary serves.

pub mod properties;
pub mod script;

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use shared::{component_debug, ComponentId, ObjectPayload};

use crate::error::{HostError, HostResult};
use crate::traits::Host;
use properties::{all_or_nothing, PropertyKind, PropertyValue, SetterContext, SetterTable};
use script::Interpreter;

pub use properties::PropertyOutcome;
pub use script::ScriptValue;

/// Views a screenshot may be requested for
pub const KNOWN_VIEWS: &[&str] = &[
    "Isometric", "Front", "Top", "Right", "Rear", "Bottom", "Left", "Dimetric", "Trimetric",
];

/// Name given to a document created without one
pub const DEFAULT_DOCUMENT_NAME: &str = "Unnamed";

/// Property layout of one creatable type
pub struct TypeSpec {
    pub type_id: &'static str,
    pub properties: &'static [(&'static str, PropertyKind)],
}

impl TypeSpec {
    pub fn kind_of(&self, property: &str) -> Option<PropertyKind> {
        if property == "Label" {
            return Some(PropertyKind::Text);
        }
        self.properties
            .iter()
            .find(|(name, _)| *name == property)
            .map(|(_, kind)| *kind)
    }

    /// Short name used when an object is created without one
    pub fn base_name(&self) -> &'static str {
        self.type_id.rsplit("::").next().unwrap_or(self.type_id)
    }

    fn defaults(&self) -> BTreeMap<String, PropertyValue> {
        self.properties
            .iter()
            .map(|(name, kind)| {
                let value = match (name, kind) {
                    (_, PropertyKind::Placement) => PropertyValue::identity_placement(),
                    (_, PropertyKind::Vector) => PropertyValue::Vector([0.0; 3]),
                    (_, PropertyKind::Link) => PropertyValue::Link(None),
                    (_, PropertyKind::LinkList) => PropertyValue::LinkList(Vec::new()),
                    (_, PropertyKind::Text) => PropertyValue::Text(String::new()),
                    (&"Angle", _) => PropertyValue::Scalar(360.0),
                    (&"Radius", _) if self.type_id == "Part::Sphere" => PropertyValue::Scalar(5.0),
                    (&"Radius" | &"Radius1", _) => PropertyValue::Scalar(2.0),
                    (&"Radius2", _) => PropertyValue::Scalar(4.0),
                    (_, PropertyKind::Scalar) => PropertyValue::Scalar(10.0),
                };
                (name.to_string(), value)
            })
            .collect()
    }
}

const PLACED: (&str, PropertyKind) = ("Placement", PropertyKind::Placement);

/// Types the reference host can create
pub const CATALOGUE: &[TypeSpec] = &[
    TypeSpec {
        type_id: "Part::Box",
        properties: &[
            ("Length", PropertyKind::Scalar),
            ("Width", PropertyKind::Scalar),
            ("Height", PropertyKind::Scalar),
            PLACED,
        ],
    },
    TypeSpec {
        type_id: "Part::Cylinder",
        properties: &[
            ("Radius", PropertyKind::Scalar),
            ("Height", PropertyKind::Scalar),
            ("Angle", PropertyKind::Scalar),
            PLACED,
        ],
    },
    TypeSpec {
        type_id: "Part::Sphere",
        properties: &[("Radius", PropertyKind::Scalar), PLACED],
    },
    TypeSpec {
        type_id: "Part::Cone",
        properties: &[
            ("Radius1", PropertyKind::Scalar),
            ("Radius2", PropertyKind::Scalar),
            ("Height", PropertyKind::Scalar),
            PLACED,
        ],
    },
    TypeSpec {
        type_id: "Part::Fuse",
        properties: &[("Base", PropertyKind::Link), ("Tool", PropertyKind::Link), PLACED],
    },
    TypeSpec {
        type_id: "Part::Cut",
        properties: &[("Base", PropertyKind::Link), ("Tool", PropertyKind::Link), PLACED],
    },
    TypeSpec {
        type_id: "Part::Common",
        properties: &[("Base", PropertyKind::Link), ("Tool", PropertyKind::Link), PLACED],
    },
    TypeSpec {
        type_id: "Part::MultiFuse",
        properties: &[("Shapes", PropertyKind::LinkList), PLACED],
    },
    TypeSpec {
        type_id: "Draft::Vector",
        properties: &[("Direction", PropertyKind::Vector), PLACED],
    },
    TypeSpec {
        type_id: "App::DocumentObjectGroup",
        properties: &[("Group", PropertyKind::LinkList)],
    },
];

pub fn type_spec(type_id: &str) -> Option<&'static TypeSpec> {
    CATALOGUE.iter().find(|spec| spec.type_id == type_id)
}

#[derive(Debug, Clone)]
struct HostObject {
    spec: &'static str,
    label: String,
    properties: BTreeMap<String, PropertyValue>,
    touched: bool,
    recomputes: u64,
}

impl HostObject {
    fn payload(&self, name: &str) -> ObjectPayload {
        let mut properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect();
        properties.insert("Touched".to_string(), Value::Bool(self.touched));
        properties.insert("Recomputes".to_string(), Value::from(self.recomputes));

        ObjectPayload {
            name: name.to_string(),
            type_id: self.spec.to_string(),
            label: self.label.clone(),
            properties,
        }
    }
}

#[derive(Debug, Default)]
struct Document {
    /// Creation order is the listing order
    order: Vec<String>,
    objects: HashMap<String, HostObject>,
    recomputes: u64,
}

#[derive(Default)]
pub struct DocumentHost {
    documents: BTreeMap<String, Document>,
    /// Creation order of documents
    document_order: Vec<String>,
    active: Option<String>,
    setters: SetterTable,
    interpreter: Interpreter,
    views: HashMap<String, Vec<u8>>,
}

impl DocumentHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the image served for `view` (fluent API)
    pub fn with_view_image(mut self, view: impl Into<String>, png: Vec<u8>) -> Self {
        self.views.insert(view.into(), png);
        self
    }

    /// Register a view image read from disk
    pub fn load_view_image(&mut self, view: &str, path: &Path) -> std::io::Result<()> {
        let png = std::fs::read(path)?;
        self.views.insert(view.to_string(), png);
        Ok(())
    }

    pub fn active_document(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// How many times `doc` has been recomputed
    pub fn recompute_count(&self, doc: &str) -> Option<u64> {
        self.documents.get(doc).map(|document| document.recomputes)
    }

    /// Script variable from the `execute_code` session
    pub fn script_variable(&self, name: &str) -> Option<&ScriptValue> {
        self.interpreter.variable(name)
    }

    fn document(&self, doc: &str) -> HostResult<&Document> {
        self.documents.get(doc).ok_or_else(|| HostError::DocumentNotFound { doc: doc.to_string() })
    }

    fn document_mut(&mut self, doc: &str) -> HostResult<&mut Document> {
        self.documents
            .get_mut(doc)
            .ok_or_else(|| HostError::DocumentNotFound { doc: doc.to_string() })
    }

    /// Validate a batch against the object's type, all or nothing
    fn validate(
        &self,
        document: &Document,
        spec: &TypeSpec,
        owner: &str,
        properties: &Map<String, Value>,
    ) -> HostResult<Vec<(String, PropertyValue)>> {
        let is_object = |name: &str| document.objects.contains_key(name);
        let context = SetterContext {
            owner,
            is_object: &is_object,
        };
        let outcomes = self
            .setters
            .validate(&|property: &str| spec.kind_of(property), properties, &context);
        all_or_nothing(outcomes).map_err(|details| HostError::InvalidProperties { details })
    }
}

/// `base`, or `base001`, `base002`, ... if taken
fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}{n:03}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn sanitize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn apply(object: &mut HostObject, values: Vec<(String, PropertyValue)>) {
    for (name, value) in values {
        match value {
            PropertyValue::Text(label) if name == "Label" => object.label = label,
            value => {
                object.properties.insert(name, value);
            }
        }
    }
    object.touched = true;
}

impl Host for DocumentHost {
    fn create_document(&mut self, name: &str) -> HostResult<String> {
        let base = match sanitize(name) {
            base if base.is_empty() => DEFAULT_DOCUMENT_NAME.to_string(),
            base => base,
        };
        let name = unique_name(&base, |candidate| self.documents.contains_key(candidate));

        self.documents.insert(name.clone(), Document::default());
        self.document_order.push(name.clone());
        self.active = Some(name.clone());
        component_debug!(ComponentId::current(), "📄 Created document {}", name);
        Ok(name)
    }

    fn create_object(
        &mut self,
        doc: &str,
        type_id: &str,
        name: &str,
        properties: &Map<String, Value>,
    ) -> HostResult<String> {
        let spec = type_spec(type_id).ok_or_else(|| HostError::UnknownType {
            type_id: type_id.to_string(),
        })?;
        let document = self.document(doc)?;

        let base = match sanitize(name) {
            base if base.is_empty() => spec.base_name().to_string(),
            base => base,
        };
        let name = unique_name(&base, |candidate| document.objects.contains_key(candidate));
        let values = self.validate(document, spec, &name, properties)?;

        let mut object = HostObject {
            spec: spec.type_id,
            label: name.clone(),
            properties: spec.defaults(),
            touched: true,
            recomputes: 0,
        };
        apply(&mut object, values);

        let document = self.document_mut(doc)?;
        document.order.push(name.clone());
        document.objects.insert(name.clone(), object);
        Ok(name)
    }

    fn edit_object(&mut self, doc: &str, name: &str, properties: &Map<String, Value>) -> HostResult<String> {
        let document = self.document(doc)?;
        let object = document.objects.get(name).ok_or_else(|| HostError::ObjectNotFound {
            doc: doc.to_string(),
            name: name.to_string(),
        })?;
        let spec = type_spec(object.spec).ok_or_else(|| HostError::UnknownType {
            type_id: object.spec.to_string(),
        })?;
        let values = self.validate(document, spec, name, properties)?;

        if let Some(object) = self.document_mut(doc)?.objects.get_mut(name) {
            apply(object, values);
        }
        Ok(name.to_string())
    }

    fn delete_object(&mut self, doc: &str, name: &str) -> HostResult<String> {
        let document = self.document_mut(doc)?;
        if document.objects.remove(name).is_none() {
            return Err(HostError::ObjectNotFound {
                doc: doc.to_string(),
                name: name.to_string(),
            });
        }
        document.order.retain(|entry| entry != name);

        // Dependents lose the reference and need a recompute
        for object in document.objects.values_mut() {
            let mut changed = false;
            for value in object.properties.values_mut() {
                changed |= value.unlink(name);
            }
            object.touched |= changed;
        }
        Ok(name.to_string())
    }

    fn execute_code(&mut self, source: &str) -> HostResult<String> {
        self.interpreter.run(source)
    }

    fn get_objects(&self, doc: &str) -> HostResult<Vec<ObjectPayload>> {
        let document = self.document(doc)?;
        Ok(document
            .order
            .iter()
            .filter_map(|name| document.objects.get(name).map(|object| object.payload(name)))
            .collect())
    }

    fn get_object(&self, doc: &str, name: &str) -> HostResult<Option<ObjectPayload>> {
        let document = self.document(doc)?;
        Ok(document.objects.get(name).map(|object| object.payload(name)))
    }

    fn list_documents(&self) -> Vec<String> {
        self.document_order.clone()
    }

    fn screenshot(&self, view: &str) -> HostResult<Option<Vec<u8>>> {
        if !KNOWN_VIEWS.contains(&view) && !self.views.contains_key(view) {
            return Err(HostError::InvalidView { view: view.to_string() });
        }
        if self.active.is_none() {
            return Ok(None);
        }
        Ok(self.views.get(view).cloned())
    }

    fn recompute(&mut self, doc: &str) -> HostResult<usize> {
        let document = self.document_mut(doc)?;
        document.recomputes += 1;

        let mut touched = 0;
        for object in document.objects.values_mut().filter(|object| object.touched) {
            object.touched = false;
            object.recomputes += 1;
            touched += 1;
        }
        Ok(touched)
    }
}
