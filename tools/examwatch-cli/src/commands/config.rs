//! Show or persist the effective configuration.

use examwatch_common::config::AppConfig;

pub fn run(config: &AppConfig, save: bool) -> anyhow::Result<()> {
    config.validate()?;
    println!("{}", serde_json::to_string_pretty(config)?);

    if save {
        let path = config.save()?;
        eprintln!("Configuration saved to {}", path.display());
    }
    Ok(())
}
