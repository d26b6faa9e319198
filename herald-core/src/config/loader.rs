use crate::config::model::ClusterConfig;

pub fn load_config() -> Result<ClusterConfig, anyhow::Error> {
    load_config_from_path("config.toml")
}

pub fn load_config_from_path(config_path: &str) -> Result<ClusterConfig, anyhow::Error> {
    let config_str = std::fs::read_to_string(config_path)?;
    let config: ClusterConfig = toml::from_str(&config_str)?;
    Ok(config)
}
