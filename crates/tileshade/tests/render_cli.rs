use std::fs;
use std::process::Command;

use tempfile::TempDir;

const SCENE: &str = r#"
version = 1

[cache]
capacity = 16

[input]
format = "128x64"

[input.channels]
R = 0.25
A = 1.0

[[channels]]
name = "mask"
type = "float"
value = 0.75

[[channels]]
name = "spec"
type = "color"
value = [1.0, 0.5, 0.25]
enabled = true

[[channels]]
name = "uv"
type = "vector2"
value = [0.0, 1.0]
"#;

fn tileshade(config_dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_tileshade"));
    command
        .env("TILESHADE_CONFIG_DIR", config_dir)
        .env_remove("TILESHADE_CONFIG")
        .env("RUST_LOG", "warn");
    command
}

#[test]
fn render_reports_shaded_and_passthrough_channels() {
    let root = TempDir::new().unwrap();
    let config_dir = root.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("tileshade.toml"), SCENE).unwrap();

    let output = tileshade(&config_dir)
        .args(["render", "--tile", "64,0"])
        .output()
        .expect("failed to run tileshade render");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let channels: Vec<&str> = report["channels"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|name| name.as_str())
        .collect();
    assert_eq!(channels, ["A", "R", "mask", "spec.B", "spec.G", "spec.R"]);

    let tiles = report["tiles"].as_array().unwrap();
    assert_eq!(tiles.len(), 1);
    assert_eq!(tiles[0]["origin"]["x"], 64);
    assert_eq!(tiles[0]["channels"]["mask"]["mean"], 0.75);
    assert_eq!(tiles[0]["channels"]["R"]["max"], 0.25);
    assert_eq!(report["format"], "128x64");
}

#[test]
fn program_lists_parameters_and_warnings() {
    let root = TempDir::new().unwrap();
    let config_path = root.path().join("scene.toml");
    fs::write(&config_path, SCENE).unwrap();

    let output = tileshade(root.path())
        .arg("--config")
        .arg(&config_path)
        .arg("program")
        .output()
        .expect("failed to run tileshade program");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let code = report["program"]["code"].as_str().unwrap();
    assert!(code.starts_with("Ci = 0;\n"));
    assert!(code.contains("Ci += outChannel( name, value);"));
    assert!(code.contains("if( enable ) Ci += outLayer( name1, value1);"));
    let warnings = report["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["binding"], "uv");
}

#[test]
fn invalid_config_fails_with_context() {
    let root = TempDir::new().unwrap();
    let config_path = root.path().join("broken.toml");
    fs::write(&config_path, "version = 3\n").unwrap();

    let output = tileshade(root.path())
        .arg("--config")
        .arg(&config_path)
        .arg("render")
        .output()
        .expect("failed to run tileshade render");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported config version 3"), "{stderr}");
}

#[test]
fn missing_config_file_uses_defaults() {
    let root = TempDir::new().unwrap();
    let output = tileshade(root.path())
        .arg("where")
        .output()
        .expect("failed to run tileshade where");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("(built-in defaults)"));
    assert!(stdout.contains(&root.path().join("tileshade.toml").display().to_string()));
}
