use anyhow::Result;

fn main() -> Result<()> {
    memoir::cli::run()
}
