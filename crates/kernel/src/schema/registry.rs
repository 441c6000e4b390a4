//! Named schema registry.
//!
//! Ships the dashboard's request schemas and optionally loads more from a
//! directory of YAML files (one schema per file). A file whose `name`
//! matches a built-in schema replaces it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use super::{FieldSpec, Format, Schema};

/// E.164-ish phone numbers, optional leading `+`.
const PHONE_PATTERN: &str = r"^\+?[1-9]\d{1,14}$";

/// Schema loading and lookup errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse schema file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },

    #[error("schema '{schema}' field '{field}' has an invalid pattern")]
    InvalidPattern {
        schema: String,
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown schema '{0}'")]
    Unknown(String),
}

/// Registry of schemas keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in dashboard schemas.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for schema in builtin_schemas() {
            // Built-in patterns are constants; a failure here is a programming error
            // caught by the unit tests below.
            if let Err(e) = registry.register(schema) {
                tracing::error!(error = %e, "built-in schema rejected");
            }
        }
        registry
    }

    /// Add or replace a schema after checking it.
    pub fn register(&mut self, schema: Schema) -> Result<(), SchemaError> {
        schema.check()?;
        if self.schemas.contains_key(&schema.name) {
            debug!(schema = %schema.name, "replacing registered schema");
        }
        self.schemas.insert(schema.name.clone(), Arc::new(schema));
        Ok(())
    }

    /// Load every `*.yml` / `*.yaml` file in `dir`.
    ///
    /// Returns the number of schemas loaded. Files are processed in name
    /// order so replacement is deterministic.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, SchemaError> {
        let entries = std::fs::read_dir(dir).map_err(|source| SchemaError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == "yml" || ext == "yaml")
            })
            .collect();
        paths.sort();

        for path in &paths {
            let raw = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
                path: path.clone(),
                source,
            })?;
            let schema: Schema = serde_yml::from_str(&raw).map_err(|source| SchemaError::Parse {
                path: path.clone(),
                source,
            })?;
            info!(schema = %schema.name, path = %path.display(), "loaded schema");
            self.register(schema)?;
        }

        Ok(paths.len())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.get(name).cloned()
    }

    /// Look up a schema that a route depends on.
    pub fn require(&self, name: &str) -> Result<Arc<Schema>, SchemaError> {
        self.get(name)
            .ok_or_else(|| SchemaError::Unknown(name.to_string()))
    }

    /// Registered schema names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

fn non_negative() -> FieldSpec {
    FieldSpec::number()
        .coerce()
        .min(0.0)
        .message("Value cannot be negative")
}

fn positive() -> FieldSpec {
    FieldSpec::number()
        .coerce()
        .positive()
        .message("Value must be greater than 0")
}

fn name() -> FieldSpec {
    FieldSpec::string()
        .min(2.0)
        .max(100.0)
        .message("Name must be at least 2 characters")
}

fn email() -> FieldSpec {
    FieldSpec::string()
        .format(Format::Email)
        .message("Invalid email address")
        .optional()
        .allow_empty()
}

fn phone() -> FieldSpec {
    FieldSpec::string()
        .pattern(PHONE_PATTERN)
        .message("Invalid phone number format")
        .optional()
        .allow_empty()
}

fn builtin_schemas() -> Vec<Schema> {
    vec![
        Schema::new("ping")
            .describe("Smoke-test body for authenticated + validated routes")
            .field("action", FieldSpec::string().literal("ping")),
        Schema::new("customer_update")
            .describe("Partial customer update keyed by id")
            .field("id", FieldSpec::string().format(Format::Uuid))
            .field("name", name().optional())
            .field("email", email())
            .field("phone", phone())
            .field("city", FieldSpec::string().optional().allow_empty()),
        Schema::new("shipment")
            .field(
                "shipmentRef",
                FieldSpec::string().min(3.0).message("Shipment Ref is required"),
            )
            .field(
                "customerId",
                FieldSpec::string().min(1.0).message("Customer is required"),
            )
            .field("origin", FieldSpec::string().min(2.0).message("Origin is required"))
            .field(
                "destination",
                FieldSpec::string().min(2.0).message("Destination is required"),
            )
            .field("weight", positive())
            .field(
                "pieces",
                FieldSpec::integer().coerce().positive().default_value(1),
            )
            .field("description", FieldSpec::string().max(200.0).optional())
            .field(
                "serviceType",
                FieldSpec::string()
                    .one_of(["standard", "express"])
                    .default_value("standard"),
            )
            .field("declaredValue", non_negative().optional()),
        Schema::new("invoice")
            .field(
                "invoiceRef",
                FieldSpec::string()
                    .min(3.0)
                    .message("Invoice reference is required"),
            )
            .field(
                "customerId",
                FieldSpec::string().min(1.0).message("Customer is required"),
            )
            .field("amount", positive())
            .field("dueDate", FieldSpec::string().optional().allow_empty())
            .field(
                "status",
                FieldSpec::string()
                    .one_of(["pending", "paid", "overdue", "partially_paid"])
                    .default_value("pending"),
            )
            .field(
                "items",
                FieldSpec::array(FieldSpec::object([
                    ("shipmentId", FieldSpec::string().optional()),
                    ("description", FieldSpec::string().min(1.0)),
                    ("amount", positive()),
                    ("weight", non_negative().optional()),
                ]))
                .optional(),
            ),
        Schema::new("queue_invoice")
            .describe("Background PDF generation request")
            .field(
                "invoiceId",
                FieldSpec::string()
                    .format(Format::Uuid)
                    .message("Invalid invoice ID"),
            ),
        Schema::new("payment")
            .field("invoiceId", FieldSpec::string().format(Format::Uuid))
            .field("amount", positive())
            .field(
                "paymentDate",
                FieldSpec::string().format(Format::DateTime).optional(),
            )
            .field(
                "paymentMode",
                FieldSpec::string().one_of(["cash", "bank_transfer", "upi", "cheque"]),
            )
            .field("reference", FieldSpec::string().optional()),
        Schema::new("simulation")
            .describe("Unauthenticated validation smoke test")
            .field("name", FieldSpec::string().min(1.0).message("Name is required"))
            .field("value", FieldSpec::number().min(0.0).message("Value must be positive"))
            .field("tags", FieldSpec::array(FieldSpec::string()).optional()),
        Schema::new("track_query")
            .describe("Public tracking lookup by shipment or barcode reference")
            .field("query", FieldSpec::string().min(1.0).max(64.0)),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::validate;
    use serde_json::json;

    #[test]
    fn builtin_schemas_all_register() {
        let registry = SchemaRegistry::with_builtin();
        assert_eq!(registry.len(), builtin_schemas().len());
        assert_eq!(
            registry.names(),
            vec![
                "customer_update",
                "invoice",
                "payment",
                "ping",
                "queue_invoice",
                "shipment",
                "simulation",
                "track_query"
            ]
        );
    }

    #[test]
    fn require_reports_unknown_schema() {
        let registry = SchemaRegistry::with_builtin();
        assert!(registry.require("ping").is_ok());
        assert!(matches!(
            registry.require("manifest"),
            Err(SchemaError::Unknown(name)) if name == "manifest"
        ));
    }

    #[test]
    fn invalid_pattern_is_rejected_at_registration() {
        let mut registry = SchemaRegistry::new();
        let schema = Schema::new("bad").field("code", FieldSpec::string().pattern("(unclosed"));
        assert!(matches!(
            registry.register(schema),
            Err(SchemaError::InvalidPattern { field, .. }) if field == "code"
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn shipment_defaults_are_filled() {
        let registry = SchemaRegistry::with_builtin();
        let schema = registry.require("shipment").unwrap();

        let out = validate(
            &schema,
            &json!({
                "shipmentRef": "SHP-DEL-2512-0042",
                "customerId": "c-1",
                "origin": "Imphal",
                "destination": "New Delhi",
                "weight": "12.5"
            }),
        )
        .unwrap();

        assert_eq!(out["weight"], 12.5);
        assert_eq!(out["pieces"], 1);
        assert_eq!(out["serviceType"], "standard");
    }

    #[test]
    fn payment_rejects_unknown_mode() {
        let registry = SchemaRegistry::with_builtin();
        let schema = registry.require("payment").unwrap();

        let errors = validate(
            &schema,
            &json!({
                "invoiceId": "67e55044-10b1-426f-9247-bb680e5fe0c8",
                "amount": 100,
                "paymentMode": "barter"
            }),
        )
        .unwrap_err();

        assert_eq!(
            errors["paymentMode"],
            "must be one of: cash, bank_transfer, upi, cheque"
        );
    }

    #[test]
    fn simulation_reports_every_field() {
        let registry = SchemaRegistry::with_builtin();
        let schema = registry.require("simulation").unwrap();

        let errors = validate(&schema, &json!({"name": "", "value": -1, "tags": ["a", 2]})).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors["name"], "Name is required");
        assert_eq!(errors["value"], "Value must be positive");
        assert_eq!(errors["tags.1"], "expected string, received number");

        let out = validate(&schema, &json!({"name": "load", "value": 0})).unwrap();
        assert_eq!(out, json!({"name": "load", "value": 0}));
    }

    #[test]
    fn load_dir_reads_yaml_and_overrides_builtin() {
        let dir = std::env::temp_dir().join(format!("tapango-schemas-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("ping.yml"),
            "name: ping\nfields:\n  action:\n    type: string\n    enum: [ping, pong]\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("scan.yaml"),
            "name: scan\nfields:\n  barcode:\n    type: string\n    min: 6\n  location:\n    type: string\n    required: false\n",
        )
        .unwrap();
        std::fs::write(dir.join("README.txt"), "ignored").unwrap();

        let mut registry = SchemaRegistry::with_builtin();
        let loaded = registry.load_dir(&dir).unwrap();
        assert_eq!(loaded, 2);

        let ping = registry.require("ping").unwrap();
        assert!(validate(&ping, &json!({"action": "pong"})).is_ok());

        let scan = registry.require("scan").unwrap();
        let errors = validate(&scan, &json!({"barcode": "123"})).unwrap_err();
        assert_eq!(errors["barcode"], "must be at least 6 characters");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_dir_reports_parse_errors() {
        let dir = std::env::temp_dir().join(format!("tapango-schemas-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("broken.yml"), "name: broken\nfields:\n  x:\n    kind: string\n").unwrap();

        let mut registry = SchemaRegistry::new();
        assert!(matches!(
            registry.load_dir(&dir),
            Err(SchemaError::Parse { .. })
        ));

        std::fs::remove_dir_all(&dir).ok();
    }
}
