// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::path::Path;

use anyhow::{Context as _, Result};
use bake_config::Document;
use fs_err as fs;

pub(crate) fn fixtures_path() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures"))
}

/// Reads the given files of a fixture directory, in order.
pub(crate) fn documents(model: &str, files: &[&str]) -> Result<Vec<Document>> {
    let dir = fixtures_path().join(model);
    files
        .iter()
        .map(|&name| {
            let data = fs::read(dir.join(name)).with_context(|| format!("fixture {model}"))?;
            Ok(Document::new(name, data))
        })
        .collect()
}

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
