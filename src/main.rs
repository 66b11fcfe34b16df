use anyhow::Context;

fn main() -> anyhow::Result<()> {
    storerate::run().context("storerate command failed")
}
