pub fn handle() -> anyhow::Result<()> {
    println!("iflow {}", env!("CARGO_PKG_VERSION"));
    match infraflow_config::get_config_dir() {
        Ok(dir) => println!("config: {}", dir.display()),
        Err(e) => tracing::debug!(error = %e, "No configuration directory"),
    }
    Ok(())
}
