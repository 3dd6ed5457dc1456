//! `gitward patch` command - apply or delete objects from a local file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use gitward_core::{BodyFormat, GitOpsRequest, Operation, Orchestrator, parse_objects};

use crate::output;
use crate::services::Workspace;

/// Split `NAMESPACE/NAME`.
fn split_api(api: &str) -> Result<(&str, &str)> {
    match api.split_once('/') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() => Ok((ns, name)),
        _ => bail!("Invalid API reference {api:?}, expected NAMESPACE/NAME"),
    }
}

fn format_of(file: &Path) -> BodyFormat {
    match file.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => BodyFormat::Yaml,
        _ => BodyFormat::Json,
    }
}

/// Run the patch command.
pub fn run(config: &Path, api: &str, delete: bool, file: &Path) -> Result<()> {
    let (namespace, name) = split_api(api)?;
    let ws = Workspace::load(config)?;
    let api = ws.config.api(namespace, name)?;

    let body = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let objects = parse_objects(&body, format_of(file))?;
    let operation = if delete {
        Operation::Delete
    } else {
        Operation::Apply
    };

    let connector = ws.api_connector(api)?;
    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(
        Orchestrator::new(&connector, api).run(&GitOpsRequest { operation, objects }),
    )?;

    if outcome.commit.is_some() {
        output::success(&outcome.to_string());
        output::detail(&format!("  branch: {}", outcome.branch));
    } else {
        output::info(&outcome.to_string());
    }
    Ok(())
}
