//! The `cacheload` binary.
//!
//! See the library documentation of [`cacheload`] for how load is generated.

fn main() -> anyhow::Result<()> {
    cacheload::cli::execute()
}
