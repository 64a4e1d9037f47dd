use std::env;

use anyhow::Context as _;
use anyhow::Result;

use grev::git_revision_auto;


/// Embed the package version, along with the git revision it was built
/// from, if available, as `VERSION`.
fn main() -> Result<()> {
    let dir = env::var("CARGO_MANIFEST_DIR").context("CARGO_MANIFEST_DIR not set")?;
    let version = match git_revision_auto(dir)? {
        Some(git_rev) => format!("{} ({git_rev})", env!("CARGO_PKG_VERSION")),
        None => env!("CARGO_PKG_VERSION").to_string(),
    };
    println!("cargo:rustc-env=VERSION={version}");
    Ok(())
}
