use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};

use assetdag::config::{DefaultSection, load_and_validate, load_from_str};
use assetdag::errors::AssetdagError;
use assetdag::types::{AssetClass, DestinationKind, LastRunStorage};
use assetdag_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};

type TestResult = Result<(), Box<dyn Error>>;

const MINIMAL: &str = r#"
[[task]]
name = "styles"
class = "style"
processor = "concat"
sources = ["src/assets/sass/**/*.css"]
destination = "public/assets/css/common.css"
"#;

#[test]
fn minimal_config_gets_defaults() -> TestResult {
    let cfg = load_from_str(MINIMAL)?;

    assert_eq!(cfg.config.concurrency, 4);
    assert_eq!(cfg.config.debounce_ms, 200);
    assert_eq!(cfg.config.history_len, 16);
    assert_eq!(cfg.config.last_run_storage, LastRunStorage::Memory);
    assert!(cfg.reload.enabled);
    assert_eq!(cfg.reload.host, "127.0.0.1");
    assert_eq!(cfg.reload.port, 35729);
    assert!(cfg.serve.enabled);
    assert_eq!(cfg.serve.port, 8080);
    assert_eq!(cfg.serve.dir, PathBuf::from("public"));
    assert!(cfg.serve.inject_reload);

    let task = cfg.task("styles").expect("task present");
    assert_eq!(task.class, AssetClass::Style);
    assert_eq!(task.destination_kind, DestinationKind::Auto);
    assert!(task.after.is_empty());
    assert!(!task.incremental);
    assert!(task.options.is_empty());
    Ok(())
}

#[test]
fn full_config_parses_every_section() -> TestResult {
    let cfg = load_from_str(
        r#"
[config]
root = "site"
concurrency = 2
debounce_ms = 50
last_run_storage = "file"
data_dir = "src/data"
clean = ["public"]
history_len = 4

[default]
exclude = ["**/*.tmp"]
use_hash = true

[reload]
enabled = false
port = 0

[serve]
port = 3000
dir = "dist"
inject_reload = false

[[task]]
name = "templates"
class = "markup"
processor = "command"
sources = ["src/templates/**/*.html"]
destination = "public"
destination_kind = "dir"
incremental = true
options = { cmd = "render", args = ["--out", "public"] }

[[task]]
name = "sitemap"
class = "markup"
processor = "command"
sources = ["src/sitemap.toml"]
destination = "public/sitemap.xml"
after = ["templates"]
use_hash = false
"#,
    )?;

    assert_eq!(cfg.config.root, Some(PathBuf::from("site")));
    assert_eq!(cfg.config.concurrency, 2);
    assert_eq!(cfg.config.last_run_storage, LastRunStorage::File);
    assert_eq!(cfg.config.data_dir, Some(PathBuf::from("src/data")));
    assert_eq!(cfg.config.clean, vec![PathBuf::from("public")]);
    assert!(!cfg.reload.enabled);
    assert_eq!(cfg.reload.port, 0);
    assert_eq!(cfg.serve.port, 3000);
    assert_eq!(cfg.serve.dir, PathBuf::from("dist"));
    assert!(!cfg.serve.inject_reload);

    let templates = cfg.task("templates").expect("templates");
    assert_eq!(templates.destination_kind, DestinationKind::Dir);
    assert!(templates.incremental);
    assert_eq!(templates.options["cmd"].as_str(), Some("render"));
    assert!(templates.effective_use_hash(cfg.default.use_hash.unwrap_or(false)));

    let sitemap = cfg.task("sitemap").expect("sitemap");
    assert_eq!(sitemap.after, vec!["templates".to_string()]);
    assert!(!sitemap.effective_use_hash(true));

    assert_eq!(
        cfg.project_root(Path::new("/work")),
        PathBuf::from("/work/site")
    );
    Ok(())
}

#[test]
fn project_root_defaults_to_config_dir() -> TestResult {
    let cfg = load_from_str(MINIMAL)?;
    assert_eq!(cfg.project_root(Path::new("/work")), PathBuf::from("/work"));
    Ok(())
}

#[test]
fn unknown_asset_class_is_a_parse_error() {
    let err = load_from_str(
        r#"
[[task]]
name = "fonts"
class = "font"
processor = "copy"
sources = ["src/fonts/*"]
destination = "public/fonts"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, AssetdagError::TomlError(_)), "{err:?}");
}

#[test]
fn empty_task_list_is_rejected() {
    let err = load_from_str("[config]\nconcurrency = 2\n").unwrap_err();
    assert!(matches!(err, AssetdagError::ConfigError(_)), "{err:?}");
}

#[test]
fn engine_settings_are_range_checked() {
    let styles = || {
        TaskConfigBuilder::new("styles", AssetClass::Style, "concat")
            .source("src/**/*.css")
            .build()
    };

    let zero = ConfigFileBuilder::new()
        .with_task(styles())
        .with_concurrency(0)
        .try_build();
    assert!(matches!(zero, Err(AssetdagError::ConfigError(_))));

    for ms in [5, 10_000] {
        let result = ConfigFileBuilder::new()
            .with_task(styles())
            .with_debounce_ms(ms)
            .try_build();
        let rejected = matches!(
            result,
            Err(AssetdagError::ConfigError(ref msg)) if msg.contains("debounce_ms")
        );
        assert!(rejected, "debounce {ms} accepted");
    }

    assert!(
        ConfigFileBuilder::new()
            .with_task(styles())
            .with_debounce_ms(10)
            .try_build()
            .is_ok()
    );
}

#[test]
fn task_fields_must_be_present() {
    let no_sources = ConfigFileBuilder::new()
        .with_task(TaskConfigBuilder::new("styles", AssetClass::Style, "concat").build())
        .try_build();
    assert!(
        matches!(no_sources, Err(AssetdagError::ConfigError(ref msg)) if msg.contains("sources"))
    );

    let blank_name = ConfigFileBuilder::new()
        .with_task(
            TaskConfigBuilder::new("  ", AssetClass::Style, "concat")
                .source("src/**/*.css")
                .build(),
        )
        .try_build();
    assert!(matches!(blank_name, Err(AssetdagError::ConfigError(_))));
}

#[test]
fn dependencies_must_name_declared_tasks() {
    let unknown = ConfigFileBuilder::new()
        .with_task(
            TaskConfigBuilder::new("sitemap", AssetClass::Markup, "command")
                .source("src/sitemap.toml")
                .after("templates")
                .build(),
        )
        .try_build();
    match unknown {
        Err(AssetdagError::UnknownDependency { task, dependency }) => {
            assert_eq!(task, "sitemap");
            assert_eq!(dependency, "templates");
        }
        other => panic!("expected UnknownDependency, got {other:?}"),
    }

    let own = ConfigFileBuilder::new()
        .with_task(
            TaskConfigBuilder::new("loop", AssetClass::Script, "copy")
                .source("src/**/*.js")
                .after("loop")
                .build(),
        )
        .try_build();
    assert!(matches!(own, Err(AssetdagError::Cycle { .. })));
}

#[test]
fn exclude_inheritance() {
    let defaults = DefaultSection {
        exclude: vec!["**/*.tmp".to_string()],
        use_hash: None,
    };

    let inherits = TaskConfigBuilder::new("a", AssetClass::Image, "copy")
        .source("src/**")
        .build();
    assert_eq!(inherits.effective_exclude(&defaults), vec!["**/*.tmp"]);

    let overrides = TaskConfigBuilder::new("b", AssetClass::Image, "copy")
        .source("src/**")
        .exclude("**/*.psd")
        .build();
    assert_eq!(overrides.effective_exclude(&defaults), vec!["**/*.psd"]);

    let appends = TaskConfigBuilder::new("c", AssetClass::Image, "copy")
        .source("src/**")
        .exclude("**/*.psd")
        .append_default_exclude(true)
        .build();
    assert_eq!(
        appends.effective_exclude(&defaults),
        vec!["**/*.psd", "**/*.tmp"]
    );
}

#[test]
fn load_and_validate_reads_from_disk() -> TestResult {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(MINIMAL.as_bytes())?;
    file.flush()?;

    let cfg = load_and_validate(file.path())?;
    assert_eq!(cfg.tasks().len(), 1);
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_and_validate(dir.path().join("assetdag.toml")).unwrap_err();
    assert!(matches!(err, AssetdagError::IoError(_)), "{err:?}");
}
