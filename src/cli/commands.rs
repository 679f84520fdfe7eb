use std::io::{self, Read};
use std::path::Path;

use clap::CommandFactory;
use clap_complete::generate;
use itertools::Itertools;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::arena::{TreeArena, PROJECTION_KEYS};
use crate::builder::TreeBuilder;
use crate::cli::args::{Cli, Commands};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::Settings;
use crate::tree_traits::TreeNodeConvert;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    debug!(?settings, "settings loaded");

    match &cli.command {
        Some(Commands::Show { file }) => _show(file, &settings),
        Some(Commands::Json { file, compact }) => _json(file, *compact, &settings),
        Some(Commands::Nodes { file }) => _nodes(file, &settings),
        Some(Commands::Find { file, id, keys }) => _find(file, id, keys, &settings),
        Some(Commands::Config) => _config(&settings),
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        None => Err(CliError::InvalidArgs(
            "no command given, see --help".to_string(),
        )),
    }
}

/// Reads `file` (`-` for stdin) and parses it as JSON.
fn read_json(file: &Path) -> CliResult<Value> {
    let mut content = String::new();
    if file == Path::new("-") {
        io::stdin()
            .read_to_string(&mut content)
            .map_err(|source| CliError::Io {
                path: file.to_path_buf(),
                source,
            })?;
    } else {
        content = std::fs::read_to_string(file).map_err(|source| CliError::Io {
            path: file.to_path_buf(),
            source,
        })?;
    }
    serde_json::from_str(&content).map_err(|source| CliError::Json {
        path: file.to_path_buf(),
        source,
    })
}

fn load_tree(file: &Path, settings: &Settings) -> CliResult<TreeArena> {
    let json = read_json(file)?;
    let arena = TreeBuilder::from_settings(settings).build(&json)?;
    debug!(nodes = arena.len(), "tree loaded");
    Ok(arena)
}

fn render_json(value: &Value, pretty: bool) -> CliResult<String> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    rendered.map_err(|e| CliError::InvalidArgs(e.to_string()))
}

#[instrument(skip(settings))]
fn _show(file: &Path, settings: &Settings) -> CliResult<()> {
    let arena = load_tree(file, settings)?;
    output::info(&arena.to_tree_string());
    Ok(())
}

#[instrument(skip(settings))]
fn _json(file: &Path, compact: bool, settings: &Settings) -> CliResult<()> {
    let arena = load_tree(file, settings)?;
    let json = arena.root().map_or(Value::Null, |root| arena.tree_json(root));
    output::info(&render_json(&json, settings.indent_json && !compact)?);
    Ok(())
}

#[instrument(skip(settings))]
fn _nodes(file: &Path, settings: &Settings) -> CliResult<()> {
    let arena = load_tree(file, settings)?;
    if let Some(root) = arena.root() {
        for idx in arena.all_nodes(root) {
            if let Some(node) = arena.node(idx) {
                output::info(node.id());
            }
        }
    }
    Ok(())
}

#[instrument(skip(settings))]
fn _find(file: &Path, id: &str, keys: &[String], settings: &Settings) -> CliResult<()> {
    for key in keys.iter().filter(|k| !PROJECTION_KEYS.contains(&k.as_str())) {
        output::warning(&format!("unknown key '{}' ignored", key));
    }
    let arena = load_tree(file, settings)?;
    let projection = arena
        .root()
        .and_then(|root| arena.find_node_projection(root, id, keys))
        .ok_or_else(|| CliError::NotFound(id.to_string()))?;
    debug!("projected keys: {}", projection.keys().join(", "));
    output::info(&render_json(
        &Value::Object(projection),
        settings.indent_json,
    )?);
    Ok(())
}

fn _config(settings: &Settings) -> CliResult<()> {
    output::header("Effective settings");
    output::info(&settings.to_toml()?);
    Ok(())
}
