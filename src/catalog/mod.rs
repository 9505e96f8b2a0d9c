//! Command catalog: keyword schemas, validation and result type inference.
//!
//! The history consults the catalog through the `CommandCatalog` trait only.
//! `StaticCatalog` is a data-driven implementation loaded from TOML; a small
//! built-in catalog is embedded in the crate.

mod schema;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::{ConversionLevel, FileAttr, Keywords, NodeId, TypeInferenceError, Value};

pub use schema::{CommandSchema, KeywordKind, KeywordSchema, ResultRule};

const BUILTIN: &str = include_str!("builtin.toml");

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("failed to read catalog {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Resolves the result type of a referenced command, if known.
pub type RefTypes<'a> = &'a dyn Fn(NodeId) -> Option<String>;

pub trait CommandCatalog: Send + Sync + fmt::Debug {
    fn schema(&self, title: &str) -> Option<&CommandSchema>;

    /// Problems found in `storage`; empty when the command is well formed.
    fn validate(&self, title: &str, storage: &Keywords, types: RefTypes<'_>) -> Vec<String>;

    fn result_type(
        &self,
        title: &str,
        storage: &Keywords,
        level: ConversionLevel,
    ) -> Result<Option<String>, TypeInferenceError>;

    /// Logical units used by `storage`, with the direction declared by the
    /// schema, in keyword order.
    fn file_units(&self, title: &str, storage: &Keywords) -> Vec<(u32, FileAttr)> {
        let mut out = Vec::new();
        if let Some(schema) = self.schema(title) {
            collect_units(&schema.keywords, storage, &mut out);
        }
        out
    }
}

fn collect_units(
    schemas: &BTreeMap<String, KeywordSchema>,
    storage: &Keywords,
    out: &mut Vec<(u32, FileAttr)>,
) {
    for (name, value) in storage {
        let Some(schema) = schemas.get(name) else {
            continue;
        };
        for item in flatten(value) {
            match (schema.file, item) {
                (Some(attr), Value::Int(unit)) => {
                    if let Ok(unit) = u32::try_from(*unit) {
                        out.push((unit, attr));
                    }
                }
                (_, Value::Block(nested)) => collect_units(&schema.keywords, nested, out),
                _ => {}
            }
        }
    }
}

fn flatten(value: &Value) -> Vec<&Value> {
    match value {
        Value::List(items) => items.iter().collect(),
        other => vec![other],
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    commands: BTreeMap<String, CommandSchema>,
}

impl StaticCatalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let file: schema::CatalogFile = toml::from_str(raw)?;
        Ok(Self {
            commands: file
                .commands
                .into_iter()
                .map(|cmd| (cmd.name.clone(), cmd))
                .collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }
}

impl CommandCatalog for StaticCatalog {
    fn schema(&self, title: &str) -> Option<&CommandSchema> {
        self.commands.get(title)
    }

    fn validate(&self, title: &str, storage: &Keywords, types: RefTypes<'_>) -> Vec<String> {
        let Some(schema) = self.commands.get(title) else {
            return vec![format!("unknown command `{title}`")];
        };
        let mut problems = Vec::new();
        check_keywords(&schema.keywords, storage, types, "", &mut problems);
        problems
    }

    fn result_type(
        &self,
        title: &str,
        storage: &Keywords,
        level: ConversionLevel,
    ) -> Result<Option<String>, TypeInferenceError> {
        let Some(schema) = self.commands.get(title) else {
            return match level {
                ConversionLevel::BestEffort => Ok(None),
                ConversionLevel::Strict => Err(TypeInferenceError {
                    command: title.to_string(),
                    reason: "unknown command".into(),
                }),
            };
        };
        match &schema.result {
            None => Ok(None),
            Some(ResultRule::Fixed(ty)) => Ok(Some(ty.clone())),
            Some(ResultRule::Conditional {
                keyword,
                cases,
                default,
            }) => {
                let selected = storage
                    .get(keyword)
                    .and_then(Value::as_text)
                    .and_then(|key| cases.get(key));
                if let Some(ty) = selected {
                    return Ok(Some(ty.clone()));
                }
                match level {
                    ConversionLevel::BestEffort => Ok(default
                        .clone()
                        .or_else(|| cases.values().next().cloned())),
                    ConversionLevel::Strict => Err(TypeInferenceError {
                        command: title.to_string(),
                        reason: match storage.get(keyword) {
                            None => format!("keyword {keyword} is required to infer the type"),
                            Some(value) => {
                                format!("unsupported value {value:?} for keyword {keyword}")
                            }
                        },
                    }),
                }
            }
        }
    }
}

fn check_keywords(
    schemas: &BTreeMap<String, KeywordSchema>,
    storage: &Keywords,
    types: RefTypes<'_>,
    prefix: &str,
    problems: &mut Vec<String>,
) {
    for (name, schema) in schemas {
        if schema.required && !storage.contains_key(name) {
            problems.push(format!("missing required keyword {prefix}{name}"));
        }
    }
    for (name, value) in storage {
        let path = format!("{prefix}{name}");
        let Some(schema) = schemas.get(name) else {
            problems.push(format!("unknown keyword {path}"));
            continue;
        };
        match value {
            Value::List(items) if schema.many => {
                for item in items {
                    check_value(schema, item, types, &path, problems);
                }
            }
            Value::List(_) => problems.push(format!("keyword {path} takes a single value")),
            other => check_value(schema, other, types, &path, problems),
        }
    }
}

fn check_value(
    schema: &KeywordSchema,
    value: &Value,
    types: RefTypes<'_>,
    path: &str,
    problems: &mut Vec<String>,
) {
    let kind = schema.kind;
    match (kind, value) {
        (KeywordKind::Any, _)
        | (KeywordKind::Int, Value::Int(_))
        | (KeywordKind::Float, Value::Int(_) | Value::Float(_))
        | (KeywordKind::Bool, Value::Bool(_)) => {}
        (KeywordKind::Str, Value::Text(text)) => {
            if !schema.into.is_empty() && !schema.into.iter().any(|allowed| allowed == text) {
                problems.push(format!(
                    "keyword {path} must be one of {:?}, got {text:?}",
                    schema.into
                ));
            }
        }
        (KeywordKind::Block, Value::Block(nested)) => {
            check_keywords(&schema.keywords, nested, types, &format!("{path}/"), problems);
        }
        (KeywordKind::Ref, Value::Ref(id)) => {
            // Unresolvable references are reported as broken dependencies.
            if let Some(ty) = types(*id)
                && !schema.types.is_empty()
                && !schema.types.contains(&ty)
            {
                problems.push(format!(
                    "keyword {path} expects {}, got {ty}",
                    schema.types.join(" or ")
                ));
            }
        }
        (_, Value::Ref(id)) => {
            if let Some(ty) = types(*id)
                && !kind.accepts_variable_type(&ty)
            {
                problems.push(format!("keyword {path} cannot take a {ty}"));
            }
        }
        (_, other) => problems.push(format!(
            "keyword {path} expects {kind:?}, got {}",
            other.kind_name()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> StaticCatalog {
        StaticCatalog::builtin().unwrap()
    }

    fn no_refs(_: NodeId) -> Option<String> {
        None
    }

    #[test]
    fn builtin_catalog_parses() {
        let catalog = catalog();
        assert!(catalog.titles().any(|t| t == "LIRE_MAILLAGE"));
        let crea = catalog.schema("CREA_CHAMP").unwrap();
        assert!(matches!(crea.result, Some(ResultRule::Conditional { .. })));
    }

    #[test]
    fn missing_and_unknown_keywords_are_reported() {
        let catalog = catalog();
        let mut storage = Keywords::new();
        storage.insert("BOGUS".into(), Value::Int(1));
        let problems = catalog.validate("AFFE_MODELE", &storage, &no_refs);
        assert!(problems.iter().any(|p| p.contains("missing required keyword MAILLAGE")));
        assert!(problems.iter().any(|p| p.contains("unknown keyword BOGUS")));
        assert_eq!(
            catalog.validate("NOPE", &storage, &no_refs),
            vec!["unknown command `NOPE`".to_string()]
        );
    }

    #[test]
    fn reference_types_are_checked() {
        let catalog = catalog();
        let mut storage = Keywords::new();
        storage.insert("MODELE".into(), Value::Ref(NodeId::new(3)));
        let wrong = |_: NodeId| Some("maillage_sdaster".to_string());
        let problems = catalog.validate("MECA_STATIQUE", &storage, &wrong);
        assert_eq!(problems, vec!["keyword MODELE expects modele_sdaster, got maillage_sdaster"]);
        let right = |_: NodeId| Some("modele_sdaster".to_string());
        assert!(catalog.validate("MECA_STATIQUE", &storage, &right).is_empty());
    }

    #[test]
    fn variables_may_stand_for_literals() {
        let catalog = catalog();
        let mut elas = Keywords::new();
        elas.insert("E".into(), Value::Ref(NodeId::new(2)));
        elas.insert("NU".into(), Value::Float(0.3));
        let mut storage = Keywords::new();
        storage.insert("ELAS".into(), Value::Block(elas));
        let float = |_: NodeId| Some("float".to_string());
        assert!(catalog.validate("DEFI_MATERIAU", &storage, &float).is_empty());
        let text = |_: NodeId| Some("str".to_string());
        assert_eq!(
            catalog.validate("DEFI_MATERIAU", &storage, &text),
            vec!["keyword ELAS/E cannot take a str"]
        );
    }

    #[test]
    fn conditional_result_type() {
        let catalog = catalog();
        let mut storage = Keywords::new();
        let err = catalog
            .result_type("CREA_CHAMP", &storage, ConversionLevel::Strict)
            .unwrap_err();
        assert!(err.reason.contains("TYPE_CHAM"));
        assert_eq!(
            catalog
                .result_type("CREA_CHAMP", &storage, ConversionLevel::BestEffort)
                .unwrap(),
            Some("cham_no_sdaster".into())
        );
        storage.insert("TYPE_CHAM".into(), Value::text("ELGA_SIEF_R"));
        assert_eq!(
            catalog
                .result_type("CREA_CHAMP", &storage, ConversionLevel::Strict)
                .unwrap(),
            Some("cham_elem".into())
        );
        assert_eq!(
            catalog
                .result_type("IMPR_RESU", &storage, ConversionLevel::Strict)
                .unwrap(),
            None
        );
    }

    #[test]
    fn file_units_walk_blocks() {
        let catalog = catalog();
        let mut storage = Keywords::new();
        storage.insert("UNITE".into(), Value::Int(20));
        assert_eq!(
            catalog.file_units("LIRE_MAILLAGE", &storage),
            vec![(20, FileAttr::In)]
        );
        assert_eq!(
            catalog.file_units("IMPR_RESU", &storage),
            vec![(20, FileAttr::Out)]
        );
    }
}
