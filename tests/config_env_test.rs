//! Environment overrides for Settings.
//!
//! Kept in its own test binary: environment variables are process-global.

use std::env;
use std::fs;

use tempfile::TempDir;

use treemodel::config::{IdStrategy, Settings};

#[test]
fn given_env_vars_when_load_then_env_overrides_config_file() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("treemodel.toml");
    fs::write(&path, "id_strategy = \"numeric\"\nindent_json = true\n").unwrap();
    env::set_var("TREEMODEL_ID_STRATEGY", "uuid");
    env::set_var("TREEMODEL_INDENT_JSON", "false");

    // Act
    let settings = Settings::load(Some(path.as_path()));
    env::remove_var("TREEMODEL_ID_STRATEGY");
    env::remove_var("TREEMODEL_INDENT_JSON");

    // Assert
    let settings = settings.unwrap();
    assert_eq!(settings.id_strategy, IdStrategy::Uuid);
    assert!(!settings.indent_json);

    // invalid values are reported, not ignored
    env::set_var("TREEMODEL_ID_STRATEGY", "random");
    let result = Settings::load(None);
    env::remove_var("TREEMODEL_ID_STRATEGY");
    assert!(result.is_err());
}
