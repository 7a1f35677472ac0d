//! Mapper configuration for Tether.
//!
//! `MapperConfig` is the single configuration surface consumed by the runtime
//! mapper. It is plain data: it can be built in code, or deserialized from a
//! TOML document (typically a `[mapper]` table in an application config file).

use convert_case::{Case, Casing};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error as ThisError;

/// Default document key used to store the discriminator value.
pub const DEFAULT_DISCRIMINATOR_KEY: &str = "_t";

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("invalid mapper config: {0}")]
    Invalid(String),

    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse mapper config: {0}")]
    Parse(#[from] toml::de::Error),
}

///
/// NamingStrategy
///
/// Maps a declared Rust-side name onto the name used in stored documents.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[remain::sorted]
pub enum NamingStrategy {
    CamelCase,
    #[default]
    Identity,
    KebabCase,
    LowerCase,
    SnakeCase,
}

impl NamingStrategy {
    /// Apply this strategy to one declared name.
    #[must_use]
    pub fn apply(self, name: &str) -> String {
        match self {
            Self::CamelCase => name.to_case(Case::Camel),
            Self::Identity => name.to_string(),
            Self::KebabCase => name.to_case(Case::Kebab),
            Self::LowerCase => name.to_lowercase(),
            Self::SnakeCase => name.to_case(Case::Snake),
        }
    }
}

///
/// DiscriminatorStrategy
///
/// Derives the default discriminator value for a record type.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscriminatorStrategy {
    /// Fully-qualified type name, e.g. `app::model::User`.
    TypeName,
    /// Last path segment, e.g. `User`.
    #[default]
    SimpleName,
    /// Last path segment, lowercased.
    LowerSimpleName,
}

impl DiscriminatorStrategy {
    #[must_use]
    pub fn apply(self, type_name: &str, simple_name: &str) -> String {
        match self {
            Self::TypeName => type_name.to_string(),
            Self::SimpleName => simple_name.to_string(),
            Self::LowerSimpleName => simple_name.to_lowercase(),
        }
    }
}

///
/// MapperConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapperConfig {
    /// Naming applied to a record's simple name when no collection is declared.
    pub collection_naming: NamingStrategy,

    /// Naming applied to property names when no mapped name is declared.
    pub property_naming: NamingStrategy,

    /// Document key holding the discriminator value.
    pub discriminator_key: String,

    /// How default discriminator values are derived.
    pub discriminator: DiscriminatorStrategy,

    /// Write `null` for absent optional values instead of omitting the key.
    pub store_nulls: bool,

    /// Write empty lists instead of omitting the key.
    pub store_empties: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            collection_naming: NamingStrategy::default(),
            property_naming: NamingStrategy::default(),
            discriminator_key: DEFAULT_DISCRIMINATOR_KEY.to_string(),
            discriminator: DiscriminatorStrategy::default(),
            store_nulls: false,
            store_empties: false,
        }
    }
}

impl MapperConfig {
    /// Parse a config from a TOML document.
    ///
    /// Accepts either a bare table or one nested under `[mapper]`.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct Wrapped {
            mapper: MapperConfig,
        }

        let nested = source.lines().any(|line| line.trim() == "[mapper]");
        let config = if nested {
            toml::from_str::<Wrapped>(source)?.mapper
        } else {
            toml::from_str::<Self>(source)?
        };
        config.validate()?;

        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discriminator_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "discriminator_key must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn with_collection_naming(mut self, naming: NamingStrategy) -> Self {
        self.collection_naming = naming;
        self
    }

    #[must_use]
    pub fn with_property_naming(mut self, naming: NamingStrategy) -> Self {
        self.property_naming = naming;
        self
    }

    #[must_use]
    pub fn with_discriminator_key(mut self, key: impl Into<String>) -> Self {
        self.discriminator_key = key.into();
        self
    }

    #[must_use]
    pub const fn with_discriminator(mut self, strategy: DiscriminatorStrategy) -> Self {
        self.discriminator = strategy;
        self
    }

    #[must_use]
    pub const fn with_store_nulls(mut self, store_nulls: bool) -> Self {
        self.store_nulls = store_nulls;
        self
    }

    #[must_use]
    pub const fn with_store_empties(mut self, store_empties: bool) -> Self {
        self.store_empties = store_empties;
        self
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = MapperConfig::default();

        assert_eq!(config.discriminator_key, "_t");
        assert_eq!(config.discriminator, DiscriminatorStrategy::SimpleName);
        assert_eq!(config.collection_naming, NamingStrategy::Identity);
        assert!(!config.store_nulls);
    }

    #[test]
    fn parses_nested_mapper_table() {
        let config = MapperConfig::from_toml_str(
            r#"
            [mapper]
            collection_naming = "snake_case"
            discriminator_key = "className"
            store_empties = true
            "#,
        )
        .expect("nested mapper table should parse");

        assert_eq!(config.collection_naming, NamingStrategy::SnakeCase);
        assert_eq!(config.discriminator_key, "className");
        assert!(config.store_empties);
        assert_eq!(config.property_naming, NamingStrategy::Identity);
    }

    #[test]
    fn parses_bare_table() {
        let config = MapperConfig::from_toml_str(r#"discriminator = "lower_simple_name""#)
            .expect("bare table should parse");

        assert_eq!(config.discriminator, DiscriminatorStrategy::LowerSimpleName);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = MapperConfig::from_toml_str("colection_naming = \"snake_case\"")
            .expect_err("misspelled key should be rejected");

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_blank_discriminator_key() {
        let err = MapperConfig::from_toml_str("discriminator_key = \"  \"")
            .expect_err("blank discriminator key should be rejected");

        assert!(
            matches!(err, ConfigError::Invalid(ref message) if message.contains("discriminator_key")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn naming_strategies_rewrite_names() {
        assert_eq!(NamingStrategy::SnakeCase.apply("UserAccount"), "user_account");
        assert_eq!(NamingStrategy::KebabCase.apply("UserAccount"), "user-account");
        assert_eq!(NamingStrategy::CamelCase.apply("user_account"), "userAccount");
        assert_eq!(NamingStrategy::LowerCase.apply("UserAccount"), "useraccount");
        assert_eq!(NamingStrategy::Identity.apply("UserAccount"), "UserAccount");
    }

    #[test]
    fn discriminator_strategies_pick_names() {
        let strategy = DiscriminatorStrategy::TypeName;
        assert_eq!(strategy.apply("app::User", "User"), "app::User");
        assert_eq!(
            DiscriminatorStrategy::LowerSimpleName.apply("app::User", "User"),
            "user"
        );
    }
}
