// SPDX-License-Identifier: Apache-2.0 OR MIT

// Resolves bake definitions and prints them as JSON, like `docker buildx bake --print`.

use std::{
    io::{self, Write as _},
    path::PathBuf,
};

use anyhow::{Context as _, Result};
use bake_config::{read_targets, Document, ResolveOptions};
use fs_err as fs;
use lexopt::{
    Arg::{Long, Short, Value},
    ValueExt as _,
};

static USAGE: &str = "bake-config-resolve
Usage: cargo run --example resolve -- [OPTIONS] [TARGET]...

Arguments:
  [TARGET]...               Targets or groups to resolve [default: default]

Options:
  -f, --file <file>         Definition file, may be repeated [default: docker-bake.toml]
      --set <override>      Override a target field (e.g., targetpattern.key=value), may be repeated
  -h, --help                Print help information
  -V, --version             Print version information
";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    if let Err(e) = try_main() {
        eprintln!("error: {e:#}");
        std::process::exit(1)
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse()?;

    let documents = args
        .files
        .iter()
        .map(|path| {
            let data = fs::read(path)?;
            Ok(Document::new(path.to_string_lossy(), data))
        })
        .collect::<Result<Vec<_>>>()?;
    let options = ResolveOptions::default().overrides(args.set);
    let resolved = read_targets(&documents, &args.targets, options)
        .context("failed to resolve bake definitions")?;

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &resolved)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

struct Args {
    files: Vec<PathBuf>,
    set: Vec<String>,
    targets: Vec<String>,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut files = vec![];
        let mut set = vec![];
        let mut targets = vec![];

        let mut parser = lexopt::Parser::from_env();
        while let Some(arg) = parser.next()? {
            match arg {
                Short('f') | Long("file") => files.push(parser.value()?.into()),
                Long("set") => set.push(parser.value()?.string()?),
                Value(target) => targets.push(target.string()?),
                Short('h') | Long("help") => {
                    print!("{USAGE}");
                    std::process::exit(0);
                }
                Short('V') | Long("version") => {
                    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                    std::process::exit(0);
                }
                _ => return Err(arg.unexpected().into()),
            }
        }
        if files.is_empty() {
            files.push("docker-bake.toml".into());
        }
        if targets.is_empty() {
            targets.push("default".to_owned());
        }

        Ok(Self { files, set, targets })
    }
}
