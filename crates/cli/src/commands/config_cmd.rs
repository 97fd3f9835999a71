//! `stepwire config`: print a default configuration.

use stepwire_config::EngineConfig;

pub fn show() {
    println!("# {}", EngineConfig::config_dir().join("config.toml").display());
    print!("{}", EngineConfig::default_toml());
}

#[cfg(test)]
mod tests {
    use stepwire_config::EngineConfig;

    #[test]
    fn default_toml_parses_back() {
        let parsed: EngineConfig = toml_roundtrip(&EngineConfig::default_toml());
        assert_eq!(parsed.max_steps_per_run, EngineConfig::default().max_steps_per_run);
        assert_eq!(parsed.compaction.keep_recent, 10);
    }

    fn toml_roundtrip(text: &str) -> EngineConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, text).unwrap();
        super::super::load_config(Some(&path)).unwrap()
    }
}
