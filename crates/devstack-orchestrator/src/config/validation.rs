use super::*;
use anyhow::{anyhow, Result};
use devstack_process::{validate_program, validate_service_name};
use std::collections::HashMap;

/// Validate the complete configuration
pub fn validate_config(config: &OrchestratorConfig) -> Result<()> {
    for service in &config.services {
        validate_service_config(service)?;
    }

    let cache = config
        .service(names::CACHE)
        .ok_or_else(|| anyhow!("The cache service must be configured"))?;
    if !cache.enabled {
        return Err(anyhow!("The cache service cannot be disabled"));
    }
    if cache.port.is_none() {
        return Err(anyhow!("The cache service requires a port"));
    }
    if cache.port_policy != PortPolicy::Adopt {
        return Err(anyhow!(
            "The cache service only supports port_policy 'adopt': a running cache is reused"
        ));
    }

    validate_unique_ports(config)?;

    if config.database.enabled {
        validate_database_name(&config.database.name)?;
        if config.database.client.program.trim().is_empty() {
            return Err(anyhow!("Database client program cannot be empty"));
        }
    }

    Ok(())
}

fn validate_service_config(service: &ServiceConfig) -> Result<()> {
    let name = service.name.as_str();
    validate_service_name(name)?;
    validate_program(name, &service.program)?;

    if service.port == Some(0) {
        return Err(anyhow!("{}: port must be between 1 and 65535", name));
    }

    if service.graceful_timeout.is_zero() {
        return Err(anyhow!("{}: graceful timeout must be greater than 0", name));
    }

    if service.readiness_timeout.is_zero() {
        return Err(anyhow!("{}: readiness timeout must be greater than 0", name));
    }

    if service.args.iter().any(|a| a.contains("{port}")) && service.port.is_none() {
        return Err(anyhow!(
            "{}: arguments use {{port}} but no port is configured",
            name
        ));
    }

    Ok(())
}

/// Two services that will both be started may not share a port.
fn validate_unique_ports(config: &OrchestratorConfig) -> Result<()> {
    let mut seen: HashMap<u16, &str> = HashMap::new();
    for service in config.planned_services() {
        if let Some(port) = service.port {
            if let Some(other) = seen.insert(port, service.name.as_str()) {
                return Err(anyhow!(
                    "Port {} is configured for both {} and {}",
                    port,
                    other,
                    service.name
                ));
            }
        }
    }
    Ok(())
}

/// Database names are interpolated into SQL; only alphanumerics and `_` are accepted.
pub fn validate_database_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 63 {
        return Err(anyhow!(
            "Database name must be 1 to 63 characters long: '{}'",
            name
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(anyhow!(
            "Database name may only contain letters, digits and underscores: '{}'",
            name
        ));
    }
    Ok(())
}
