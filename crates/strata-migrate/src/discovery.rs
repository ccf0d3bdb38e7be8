//! Unit discovery.
//!
//! Migrations and seeds are compiled into the binary and registered with a
//! [`Registry`]. Anything that can list units implements
//! [`MigrationSource`]; the manager validates what it returns before any
//! database work starts.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{MigrateError, Result};
use crate::migration::{MigrationBody, MigrationUnit, SeedUnit};

/// Migration file stems: 14-digit version, underscore, snake_case name.
static MIGRATION_FILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{14})_([a-z0-9_]+)$").expect("migration file pattern is valid")
});

/// Class-style names: one or more capitalized words.
static CLASS_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z][a-z0-9]+)+$").expect("class name pattern is valid"));

/// Lists the migrations and seeds available to a run.
pub trait MigrationSource: Send + Sync {
    /// Returns every migration unit, in any order.
    fn migrations(&self) -> Result<Vec<MigrationUnit>>;

    /// Returns every seed, in discovery order.
    fn seeds(&self) -> Result<Vec<SeedUnit>>;
}

/// Build-time registry of units.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    migrations: Vec<MigrationUnit>,
    seeds: Vec<SeedUnit>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a migration unit as is.
    #[must_use]
    pub fn migration(mut self, unit: MigrationUnit) -> Self {
        self.migrations.push(unit);
        self
    }

    /// Adds a migration named after its source file.
    ///
    /// The version and class name come from the file stem, e.g.
    /// `20240101120000_create_users.rs` becomes `CreateUsers` at
    /// version `20240101120000`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedUnit` if the file name does not follow the
    /// convention.
    pub fn migration_file(mut self, path: impl AsRef<Path>, body: MigrationBody) -> Result<Self> {
        let path = path.as_ref();
        let stem = file_stem(path)?;
        let (version, name) = parse_migration_file_name(stem)?;
        self.migrations.push(MigrationUnit {
            version,
            name,
            path: Some(path.to_path_buf()),
            namespace: None,
            body,
        });
        Ok(self)
    }

    /// Adds a seed.
    ///
    /// # Errors
    ///
    /// Returns `MalformedUnit` if the seed name is not PascalCase.
    pub fn seed(mut self, unit: SeedUnit) -> Result<Self> {
        if !is_valid_class_name(&unit.name) {
            return Err(MigrateError::MalformedUnit {
                name: unit.name,
                reason: "seed names must be PascalCase".to_string(),
            });
        }
        self.seeds.push(unit);
        Ok(self)
    }

    /// Returns the number of registered migrations.
    #[must_use]
    pub fn migration_count(&self) -> usize {
        self.migrations.len()
    }
}

impl MigrationSource for Registry {
    fn migrations(&self) -> Result<Vec<MigrationUnit>> {
        Ok(self.migrations.clone())
    }

    fn seeds(&self) -> Result<Vec<SeedUnit>> {
        Ok(self.seeds.clone())
    }
}

fn file_stem(path: &Path) -> Result<&str> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| MigrateError::MalformedUnit {
            name: path.display().to_string(),
            reason: "file name is not valid UTF-8".to_string(),
        })
}

/// Splits a migration file stem into its version and class name.
///
/// # Errors
///
/// Returns `MalformedUnit` when the stem is not `<14 digits>_<snake_case>`.
pub fn parse_migration_file_name(stem: &str) -> Result<(i64, String)> {
    let malformed = || MigrateError::MalformedUnit {
        name: stem.to_string(),
        reason: "expected <YYYYMMDDHHMMSS>_<snake_case_name>".to_string(),
    };

    let captures = MIGRATION_FILE_PATTERN.captures(stem).ok_or_else(malformed)?;
    let version = captures[1].parse::<i64>().map_err(|_| malformed())?;
    let name = map_file_name_to_class_name(&captures[2]);
    if name.is_empty() {
        return Err(malformed());
    }
    Ok((version, name))
}

/// Turns `create_user_table` into `CreateUserTable`.
#[must_use]
pub fn map_file_name_to_class_name(snake: &str) -> String {
    snake
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect()
}

/// Turns `CreateUserTable` into `<version>_create_user_table`.
#[must_use]
pub fn map_class_name_to_file_name(class: &str, version: i64) -> String {
    let mut snake = String::with_capacity(class.len() + 4);
    for (i, c) in class.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                snake.push('_');
            }
            snake.extend(c.to_lowercase());
        } else {
            snake.push(c);
        }
    }
    format!("{version}_{snake}")
}

/// Checks a class-style name such as `UserSeeder`.
#[must_use]
pub fn is_valid_class_name(name: &str) -> bool {
    CLASS_NAME_PATTERN.is_match(name)
}

/// Validates migration units and indexes them by version.
///
/// # Errors
///
/// Returns `DuplicateVersion` or `DuplicateName` naming both sources.
pub fn index_migrations(units: Vec<MigrationUnit>) -> Result<BTreeMap<i64, MigrationUnit>> {
    let mut by_version: BTreeMap<i64, MigrationUnit> = BTreeMap::new();
    let mut names: HashMap<String, String> = HashMap::new();

    for unit in units {
        if let Some(existing) = by_version.get(&unit.version) {
            return Err(MigrateError::DuplicateVersion {
                version: unit.version,
                path: unit.source(),
                existing: existing.source(),
            });
        }
        let qualified = unit.qualified_name();
        if let Some(existing) = names.get(&qualified) {
            return Err(MigrateError::DuplicateName {
                name: qualified,
                existing: existing.clone(),
            });
        }
        names.insert(qualified, unit.source());
        by_version.insert(unit.version, unit);
    }
    Ok(by_version)
}

/// Validates seed names are unique, keeping discovery order.
///
/// # Errors
///
/// Returns `DuplicateName` for a repeated seed name.
pub fn index_seeds(units: Vec<SeedUnit>) -> Result<Vec<SeedUnit>> {
    let mut seen = HashSet::new();
    for unit in &units {
        if !seen.insert(unit.name.as_str()) {
            return Err(MigrateError::DuplicateName {
                name: unit.name.clone(),
                existing: unit.name.clone(),
            });
        }
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{MigrationContext, ReversibleMigration};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl ReversibleMigration for Noop {
        async fn change(&self, _ctx: &MigrationContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_migration_file_name() {
        let (version, name) =
            parse_migration_file_name("20240101120000_create_user_table").expect("valid");
        assert_eq!(version, 20_240_101_120_000);
        assert_eq!(name, "CreateUserTable");

        assert!(parse_migration_file_name("2024_create").is_err());
        assert!(parse_migration_file_name("20240101120000-create").is_err());
        assert!(parse_migration_file_name("create_users").is_err());
    }

    #[test]
    fn test_name_mapping() {
        assert_eq!(
            map_file_name_to_class_name("limit_resource_names_to_30_chars"),
            "LimitResourceNamesTo30Chars"
        );
        assert_eq!(
            map_class_name_to_file_name("CreateUserTable", 20_240_101_120_000),
            "20240101120000_create_user_table"
        );
    }

    #[test]
    fn test_class_names() {
        assert!(is_valid_class_name("UserSeeder"));
        assert!(is_valid_class_name("Seed2024"));
        assert!(!is_valid_class_name("userSeeder"));
        assert!(!is_valid_class_name("User_Seeder"));
    }

    #[test]
    fn test_registry_from_file_names() {
        let registry = Registry::new()
            .migration_file(
                "db/migrations/20240101120000_create_users.rs",
                MigrationBody::Change(Arc::new(Noop)),
            )
            .expect("valid name");
        let units = registry.migrations().expect("units");
        assert_eq!(units[0].version, 20_240_101_120_000);
        assert_eq!(units[0].name, "CreateUsers");

        let err = Registry::new()
            .migration_file("db/migrations/create_users.rs", MigrationBody::Change(Arc::new(Noop)))
            .expect_err("malformed");
        assert!(matches!(err, MigrateError::MalformedUnit { .. }));
    }

    #[test]
    fn test_duplicate_version_is_rejected() {
        let units = vec![
            MigrationUnit::change(1, "First", Noop).with_path("1_first.rs"),
            MigrationUnit::change(1, "Second", Noop).with_path("1_second.rs"),
        ];
        let err = index_migrations(units).expect_err("duplicate");
        assert!(matches!(
            err,
            MigrateError::DuplicateVersion { version: 1, ref path, ref existing }
                if path == "1_second.rs" && existing == "1_first.rs"
        ));
    }

    #[test]
    fn test_duplicate_name_respects_namespace() {
        let units = vec![
            MigrationUnit::change(1, "Init", Noop),
            MigrationUnit::change(2, "Init", Noop).with_namespace("billing"),
        ];
        assert_eq!(index_migrations(units).expect("distinct").len(), 2);

        let units = vec![
            MigrationUnit::change(1, "Init", Noop),
            MigrationUnit::change(2, "Init", Noop),
        ];
        assert!(matches!(
            index_migrations(units),
            Err(MigrateError::DuplicateName { .. })
        ));
    }
}
