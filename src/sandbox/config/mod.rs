//! The sandbox policy: which namespaces, assemblies, types and members untrusted code may use.
//!
//! The policy is loaded from the JSON document shipped with the host. Member whitelists are
//! written as C#-like declarations (`"void Write(string)"`, `"float X"`) and parsed once at
//! load time into [`MType`] shapes by [`grammar`].
//!
//! # Examples
//!
//! ```rust
//! use cilguard::SandboxConfig;
//!
//! let config = SandboxConfig::from_json(r#"{
//!     "WhitelistedNamespaces": ["Content."],
//!     "Types": {
//!         "System": {
//!             "Math": { "Methods": ["double Sqrt(double)"] }
//!         }
//!     }
//! }"#)?;
//!
//! let math = config.type_config("System", "Math").unwrap();
//! assert_eq!(math.methods.len(), 1);
//! # Ok::<(), cilguard::Error>(())
//! ```

pub mod grammar;

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::Path,
    str::FromStr,
};

use log::{error, warn};
use serde::Deserialize;

use crate::{
    sandbox::{types::MType, verify::VerifierErrorKind},
    Result,
};

/// How a whitelisted type may be used as a base type or interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum InheritMode {
    /// Allowed only if the type is whitelisted with `All`
    #[default]
    Default,
    /// Allowed
    Allow,
    /// Blocked, even if the type is whitelisted with `All`
    Block,
}

/// A whitelisted field
#[derive(Debug, Clone, PartialEq)]
pub struct WhitelistField {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: MType,
}

/// A whitelisted method overload
#[derive(Debug, Clone, PartialEq)]
pub struct WhitelistMethod {
    /// Method name
    pub name: String,
    /// Return type
    pub return_type: MType,
    /// Parameter types, in order
    pub parameter_types: Vec<MType>,
    /// Number of generic parameters of the method itself
    pub generic_parameter_count: u32,
}

/// Policy for one whitelisted type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeConfig {
    /// Every member is allowed; the member lists are not consulted
    pub all: bool,
    /// Whether the type may be derived from or implemented
    pub inherit: InheritMode,
    /// Allowed fields
    pub fields: Vec<WhitelistField>,
    /// Allowed method overloads
    pub methods: Vec<WhitelistMethod>,
    /// Policies for nested types, by simple name
    pub nested_types: BTreeMap<String, TypeConfig>,
}

/// The policy applied when a whole namespace or assembly is trusted
pub static DEFAULT_ALL: TypeConfig = TypeConfig::allow_all();

impl TypeConfig {
    /// A policy that allows every member
    #[must_use]
    pub const fn allow_all() -> Self {
        TypeConfig {
            all: true,
            inherit: InheritMode::Default,
            fields: Vec::new(),
            methods: Vec::new(),
            nested_types: BTreeMap::new(),
        }
    }

    /// Is there a whitelisted field with this name and type
    #[must_use]
    pub fn allows_field(&self, name: &str, field_type: &MType) -> bool {
        self.fields
            .iter()
            .any(|field| field.name == name && field_type.whitelist_equals(&field.field_type))
    }

    /// Is there a whitelisted overload with this exact name, return type, parameter list and
    /// generic arity
    #[must_use]
    pub fn allows_method(
        &self,
        name: &str,
        return_type: &MType,
        parameter_types: &[MType],
        generic_parameter_count: u32,
    ) -> bool {
        self.methods.iter().any(|method| {
            method.name == name
                && return_type.whitelist_equals(&method.return_type)
                && method.parameter_types.len() == parameter_types.len()
                && method.generic_parameter_count == generic_parameter_count
                && parameter_types
                    .iter()
                    .zip(&method.parameter_types)
                    .all(|(actual, allowed)| actual.whitelist_equals(allowed))
        })
    }

    /// May code derive from (or implement) a type governed by this policy
    #[must_use]
    pub fn allows_inheritance(&self) -> bool {
        match self.inherit {
            InheritMode::Block => false,
            InheritMode::Allow => true,
            InheritMode::Default => self.all,
        }
    }
}

/// The complete sandbox policy. Read-only for the duration of a scan.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfig {
    /// Name of the core library, reported to the verifier
    pub system_assembly_name: String,
    /// Namespace prefixes whose types are allowed wholesale
    pub whitelisted_namespaces: HashSet<String>,
    /// Assemblies whose types are allowed wholesale
    pub multi_assembly_wholesale_references: HashSet<String>,
    /// Verification finding kinds that are tolerated
    pub allowed_verifier_errors: HashSet<VerifierErrorKind>,
    /// Explicitly whitelisted types: namespace, then type name
    pub types: HashMap<String, HashMap<String, TypeConfig>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct RawSandboxConfig {
    system_assembly_name: String,
    whitelisted_namespaces: Vec<String>,
    multi_assembly_other_references: Vec<String>,
    allowed_verifier_errors: Vec<String>,
    types: HashMap<String, HashMap<String, RawTypeConfig>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct RawTypeConfig {
    all: bool,
    inherit: InheritMode,
    methods: Option<Vec<String>>,
    fields: Option<Vec<String>>,
    nested_types: Option<HashMap<String, RawTypeConfig>>,
}

impl RawTypeConfig {
    fn parse(self) -> Result<TypeConfig> {
        let mut methods = Vec::new();
        for declaration in self.methods.unwrap_or_default() {
            match grammar::parse_method(&declaration) {
                Ok(method) => methods.push(method),
                Err(e) => error!("Parse exception for '{}': {}", declaration, e),
            }
        }

        let mut fields = Vec::new();
        for declaration in self.fields.unwrap_or_default() {
            match grammar::parse_field(&declaration) {
                Ok(field) => fields.push(field),
                Err(e) => {
                    error!("Parse exception for '{}': {}", declaration, e);
                    return Err(e);
                }
            }
        }

        let mut nested_types = BTreeMap::new();
        for (name, nested) in self.nested_types.unwrap_or_default() {
            nested_types.insert(name, nested.parse()?);
        }

        Ok(TypeConfig {
            all: self.all,
            inherit: self.inherit,
            fields,
            methods,
            nested_types,
        })
    }
}

impl SandboxConfig {
    /// Load the policy from its JSON document.
    ///
    /// Unparseable method declarations are logged and skipped; an unparseable field
    /// declaration fails the whole load. Unknown verifier error names are logged and ignored.
    ///
    /// # Errors
    /// Returns [`crate::Error::Json`] for a document of the wrong shape and
    /// [`crate::Error::Config`] for a malformed field declaration.
    pub fn from_json(json: &str) -> Result<SandboxConfig> {
        let raw: RawSandboxConfig = serde_json::from_str(json)?;

        let mut allowed_verifier_errors = HashSet::new();
        for name in &raw.allowed_verifier_errors {
            match VerifierErrorKind::from_str(name) {
                Ok(kind) => {
                    allowed_verifier_errors.insert(kind);
                }
                Err(_) => warn!("Ignoring unknown verifier error kind '{}'", name),
            }
        }

        let mut types = HashMap::with_capacity(raw.types.len());
        for (namespace, entries) in raw.types {
            let mut parsed = HashMap::with_capacity(entries.len());
            for (name, entry) in entries {
                parsed.insert(name, entry.parse()?);
            }
            types.insert(namespace, parsed);
        }

        Ok(SandboxConfig {
            system_assembly_name: raw.system_assembly_name,
            whitelisted_namespaces: raw.whitelisted_namespaces.into_iter().collect(),
            multi_assembly_wholesale_references: raw
                .multi_assembly_other_references
                .into_iter()
                .collect(),
            allowed_verifier_errors,
            types,
        })
    }

    /// Load the policy from a JSON file.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, otherwise as
    /// [`SandboxConfig::from_json`].
    pub fn from_file(path: &Path) -> Result<SandboxConfig> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Trust every type of `assembly`, e.g. another assembly of the same content bundle
    #[must_use]
    pub fn with_wholesale_reference(mut self, assembly: impl Into<String>) -> Self {
        self.multi_assembly_wholesale_references.insert(assembly.into());
        self
    }

    /// The explicit policy for `namespace.name`, ignoring namespace and assembly grants
    #[must_use]
    pub fn type_config(&self, namespace: &str, name: &str) -> Option<&TypeConfig> {
        self.types.get(namespace)?.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::signatures::PrimitiveType, Error};

    const CONFIG: &str = r#"{
        "SystemAssemblyName": "System.Runtime",
        "WhitelistedNamespaces": ["Content.", "Robust.Shared.Maths"],
        "MultiAssemblyOtherReferences": ["Content.Shared"],
        "AllowedVerifierErrors": ["InvalidToken", "NotAnErrorWeKnow"],
        "Types": {
            "Game": {
                "Point": {
                    "Fields": ["int X"],
                    "Methods": ["void .ctor(int, int)", "not a method", "int Length()"],
                    "NestedTypes": {
                        "Enumerator": { "All": true }
                    }
                },
                "Entity": { "All": true, "Inherit": "Block" }
            }
        }
    }"#;

    #[test]
    fn load() {
        let config = SandboxConfig::from_json(CONFIG).unwrap();

        assert_eq!(config.system_assembly_name, "System.Runtime");
        assert!(config.whitelisted_namespaces.contains("Content."));
        assert!(config.multi_assembly_wholesale_references.contains("Content.Shared"));
        assert_eq!(config.allowed_verifier_errors.len(), 1);
        assert!(config
            .allowed_verifier_errors
            .contains(&VerifierErrorKind::InvalidToken));

        let point = config.type_config("Game", "Point").unwrap();
        assert!(!point.all);
        assert_eq!(point.fields.len(), 1);
        // the malformed declaration is skipped
        assert_eq!(point.methods.len(), 2);
        assert!(point.nested_types["Enumerator"].all);
        assert!(!point.allows_inheritance());

        let entity = config.type_config("Game", "Entity").unwrap();
        assert_eq!(entity.inherit, InheritMode::Block);
        assert!(!entity.allows_inheritance());
    }

    #[test]
    fn malformed_field_fails() {
        let json = r#"{ "Types": { "Game": { "Point": { "Fields": ["int"] } } } }"#;
        assert!(matches!(SandboxConfig::from_json(json), Err(Error::Config(_))));
    }

    #[test]
    fn wrong_shape_fails() {
        assert!(matches!(
            SandboxConfig::from_json(r#"{ "WhitelistedNamespaces": "Content." }"#),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn empty_document() {
        let config = SandboxConfig::from_json("{}").unwrap();
        assert!(config.types.is_empty());
        assert!(config.whitelisted_namespaces.is_empty());
    }

    #[test]
    fn method_overloads() {
        let config = SandboxConfig::from_json(CONFIG).unwrap();
        let point = config.type_config("Game", "Point").unwrap();
        let int = MType::Primitive(PrimitiveType::Int32);
        let void = MType::Primitive(PrimitiveType::Void);

        assert!(point.allows_method(".ctor", &void, &[int.clone(), int.clone()], 0));
        assert!(!point.allows_method(".ctor", &void, &[int.clone()], 0));
        assert!(!point.allows_method(".ctor", &void, &[int.clone(), int.clone()], 1));
        assert!(point.allows_method("Length", &int, &[], 0));
        assert!(!point.allows_method("Length", &void, &[], 0));

        assert!(point.allows_field("X", &int));
        assert!(!point.allows_field("Y", &int));
        assert!(!point.allows_field("X", &MType::Primitive(PrimitiveType::Int64)));
    }

    #[test]
    fn inherit_modes() {
        let mut config = TypeConfig::allow_all();
        assert!(config.allows_inheritance());
        config.inherit = InheritMode::Block;
        assert!(!config.allows_inheritance());

        let mut explicit = TypeConfig::default();
        assert!(!explicit.allows_inheritance());
        explicit.inherit = InheritMode::Allow;
        assert!(explicit.allows_inheritance());
    }
}
