//! KDL configuration parsing.

use anyhow::Result;
use tracing::{trace, warn};

use crate::Config;

mod helpers;
mod sections;

use sections::{parse_api, parse_budget, parse_cdn, parse_deployment, parse_dispatch, parse_storage};

/// Parse a complete configuration document.
///
/// Unknown top-level blocks are skipped with a warning so that newer
/// configuration files still load on older binaries.
pub fn parse_config(text: &str) -> Result<Config> {
    let doc: ::kdl::KdlDocument = text
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid KDL document: {}", e))?;

    let mut config = Config::default();

    for node in doc.nodes() {
        let name = node.name().value();
        trace!(block = %name, "Parsing top-level configuration block");

        match name {
            "storage" => config.storage = parse_storage(node)?,
            "budget" => config.budget = parse_budget(node)?,
            "dispatch" => config.dispatch = parse_dispatch(node)?,
            "deployment" => config.deployment = parse_deployment(node)?,
            "api" => config.api = parse_api(node)?,
            "cdn" => config.cdn = parse_cdn(node)?,
            other => {
                warn!(block = %other, "Ignoring unknown configuration block");
            }
        }
    }

    Ok(config)
}
