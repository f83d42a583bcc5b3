#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use assetdag::build::BuildEngine;
use assetdag::dag::TaskGraph;
use assetdag::fs::mock::MockFileSystem;
use assetdag::types::AssetClass;

pub use assetdag_test_utils::builders::{graph, task};
pub use assetdag_test_utils::fake_processor::{FakeProcessor, Gate};
pub use assetdag_test_utils::{init_tracing, wait_until, with_timeout};

pub const ROOT: &str = "/proj";

/// The site layout used throughout the tests:
///
/// - `templates` (markup) renders `src/templates/**/*.html` into `public/`
/// - `styles` (style) concatenates `src/assets/sass/**/*.css`
/// - `scripts` (script) bundles `src/assets/js/**/*.js`
/// - `images` (image) copies `src/assets/img/**/*`
/// - `sitemap` (markup) runs after `templates`
pub fn site_graph(processor: &FakeProcessor) -> TaskGraph {
    let p = processor.arc();
    graph(vec![
        task(
            "templates",
            AssetClass::Markup,
            &["src/templates/**/*.html"],
            "public/pages",
            &[],
            p.clone(),
        ),
        task(
            "styles",
            AssetClass::Style,
            &["src/assets/sass/**/*.css"],
            "public/assets/css/common.css",
            &[],
            p.clone(),
        ),
        task(
            "scripts",
            AssetClass::Script,
            &["src/assets/js/**/*.js"],
            "public/assets/js/app.js",
            &[],
            p.clone(),
        ),
        task(
            "images",
            AssetClass::Image,
            &["src/assets/img/**/*"],
            "public/assets/img",
            &[],
            p.clone(),
        ),
        task(
            "sitemap",
            AssetClass::Markup,
            &["src/sitemap.toml"],
            "public/sitemap.xml",
            &["templates"],
            p,
        ),
    ])
}

/// A mock file system holding one source file per site task.
pub fn site_fs() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/src/templates/index.html", "<h1>hi</h1>");
    fs.add_file("/proj/src/assets/sass/main.css", "body {}");
    fs.add_file("/proj/src/assets/js/app.js", "console.log(1)");
    fs.add_file("/proj/src/assets/img/logo.png", vec![0u8, 1, 2]);
    fs.add_file("/proj/src/sitemap.toml", "pages = []");
    fs
}

pub fn engine_for(graph: TaskGraph, fs: MockFileSystem) -> BuildEngine {
    BuildEngine::new(Arc::new(graph), Path::new(ROOT), Arc::new(fs))
}
