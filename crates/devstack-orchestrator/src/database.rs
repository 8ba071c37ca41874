//! Database provisioning.
//!
//! The database server is never launched; only the application database is
//! created when missing.

use crate::config::validation::validate_database_name;
use crate::config::DatabaseClientConfig;
use crate::environment::ActivatedEnvironment;
use async_trait::async_trait;
use devstack_common::{Error, Result};
use std::collections::BTreeMap;
use tokio::process::Command;
use tracing::{debug, info};

/// Talks to the database server.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn list_databases(&self) -> Result<Vec<String>>;

    async fn create_database(&self, name: &str) -> Result<()>;
}

/// What provisioning did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseOutcome {
    AlreadyExists,
    Created,
}

/// Create `name` unless it is already listed.
pub async fn ensure_database_exists(
    client: &dyn DatabaseClient,
    name: &str,
) -> Result<DatabaseOutcome> {
    validate_database_name(name).map_err(|e| Error::database(name, e.to_string()))?;

    let existing = client.list_databases().await?;
    if existing.iter().any(|db| db == name) {
        debug!(database = name, "Database already exists");
        return Ok(DatabaseOutcome::AlreadyExists);
    }

    client.create_database(name).await?;
    info!(database = name, "Database created");
    Ok(DatabaseOutcome::Created)
}

/// Runs the `psql` command line client.
#[derive(Debug, Clone)]
pub struct CommandDatabaseClient {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl CommandDatabaseClient {
    pub fn new(config: &DatabaseClientConfig, environment: &ActivatedEnvironment) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            env: environment.vars().clone(),
        }
    }

    async fn run(&self, database: &str, query_args: &[&str]) -> Result<String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .args(query_args)
            .envs(&self.env)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::database(database, format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::database(
                database,
                format!("{} ({})", stderr.trim(), output.status),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl DatabaseClient for CommandDatabaseClient {
    async fn list_databases(&self) -> Result<Vec<String>> {
        let stdout = self
            .run("pg_database", &["-tAc", "SELECT datname FROM pg_database"])
            .await?;
        Ok(parse_database_list(&stdout))
    }

    async fn create_database(&self, name: &str) -> Result<()> {
        let statement = format!("CREATE DATABASE \"{}\"", name);
        self.run(name, &["-c", &statement]).await.map(|_| ())
    }
}

/// One name per line, as printed by `psql -tA`.
fn parse_database_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
