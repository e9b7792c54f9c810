//! Database migrations - Runner interface and the production guard
//!
//! Migration contents and how they are applied belong to a
//! [`MigrationRunner`] implementation. [`run_latest`] only decides whether
//! running is allowed and reports the outcome.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::OrmConfig;
use crate::error::{ModelError, OrmResult};

/// Named migrations handed to a runner, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSet {
    migrations: BTreeMap<String, String>,
}

impl MigrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a migration; names usually start with a timestamp so they sort chronologically
    pub fn with(mut self, name: &str, up_sql: &str) -> Self {
        self.migrations.insert(name.to_string(), up_sql.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.migrations.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.migrations.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.migrations.iter().map(|(name, sql)| (name.as_str(), sql.as_str()))
    }
}

/// Whether a run applied anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    /// At least one migration was applied
    Completed,
    /// Already at the latest version
    Skipped,
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStatus::Completed => write!(f, "completed"),
            MigrationStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result reported by a runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOutcome {
    pub status: MigrationStatus,
    /// Names of the migrations applied by this run
    pub applied: Vec<String>,
}

impl MigrationOutcome {
    pub fn completed(applied: Vec<String>) -> Self {
        Self {
            status: MigrationStatus::Completed,
            applied,
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: MigrationStatus::Skipped,
            applied: Vec::new(),
        }
    }
}

/// Applies pending migrations
#[async_trait]
pub trait MigrationRunner: Send + Sync {
    async fn run_up(&self, migrations: &MigrationSet) -> OrmResult<MigrationOutcome>;
}

/// Run every pending migration.
///
/// Refuses to run in production unless `force` is set.
pub async fn run_latest(
    runner: &dyn MigrationRunner,
    migrations: &MigrationSet,
    config: &OrmConfig,
    force: bool,
) -> OrmResult<MigrationOutcome> {
    if config.is_production() && !force {
        tracing::warn!("Refusing to run migrations in production without force");
        return Err(ModelError::Migration(
            "Cannot run migrations in production".to_string(),
        ));
    }

    let outcome = runner.run_up(migrations).await?;
    match outcome.status {
        MigrationStatus::Completed => tracing::info!(
            "Database migrated successfully ({} applied)",
            outcome.applied.len()
        ),
        MigrationStatus::Skipped => tracing::info!("Database already at the latest version"),
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Applies each migration once, remembering what already ran
    #[derive(Default)]
    struct TrackingRunner {
        applied: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl MigrationRunner for TrackingRunner {
        async fn run_up(&self, migrations: &MigrationSet) -> OrmResult<MigrationOutcome> {
            let mut applied = self.applied.lock().unwrap();
            let pending: Vec<String> = migrations
                .names()
                .filter(|name| !applied.contains(*name))
                .map(str::to_string)
                .collect();
            if pending.is_empty() {
                return Ok(MigrationOutcome::skipped());
            }
            applied.extend(pending.iter().cloned());
            Ok(MigrationOutcome::completed(pending))
        }
    }

    fn migrations() -> MigrationSet {
        MigrationSet::new()
            .with("2024_01_02_create_posts", "CREATE TABLE posts (id SERIAL PRIMARY KEY)")
            .with("2024_01_01_create_users", "CREATE TABLE users (id SERIAL PRIMARY KEY)")
    }

    #[tokio::test]
    async fn test_completed_then_skipped() {
        let runner = TrackingRunner::default();
        let config = OrmConfig::default();

        let first = run_latest(&runner, &migrations(), &config, false).await.unwrap();
        assert_eq!(first.status, MigrationStatus::Completed);
        assert_eq!(first.applied, vec!["2024_01_01_create_users", "2024_01_02_create_posts"]);

        let second = run_latest(&runner, &migrations(), &config, false).await.unwrap();
        assert_eq!(second, MigrationOutcome::skipped());
    }

    #[tokio::test]
    async fn test_production_requires_force() {
        let runner = TrackingRunner::default();
        let config = OrmConfig {
            environment: Environment::Production,
            ..OrmConfig::default()
        };

        let err = run_latest(&runner, &migrations(), &config, false).await.unwrap_err();
        assert!(matches!(err, ModelError::Migration(_)));
        assert!(runner.applied.lock().unwrap().is_empty());

        let forced = run_latest(&runner, &migrations(), &config, true).await.unwrap();
        assert_eq!(forced.status, MigrationStatus::Completed);
    }
}
