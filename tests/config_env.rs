//! The environment layer of the configuration. `Jail` swaps the working
//! directory and environment for the whole process, so these run in their
//! own test binary.
use figment::Jail;
use shapdash::ProjectConfig;
use std::path::Path;

#[test]
fn test_env_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "parameters.toml",
            "target_var = \"y\"\n[dashboard]\nport = 7000\nhistogram_bins = 12",
        )?;
        jail.set_env("SHAPDASH_DASHBOARD__PORT", "9000");
        jail.set_env("SHAPDASH_MODEL__N_ESTIMATORS", "4");

        let config = ProjectConfig::load(Some(Path::new("parameters.toml"))).map_err(|e| e.to_string())?;
        assert_eq!(config.dashboard.port, 9000);
        assert_eq!(config.dashboard.histogram_bins, 12);
        assert_eq!(config.model.n_estimators, 4);
        assert_eq!(config.target_var, "y");
        Ok(())
    });
}

#[test]
fn test_env_without_file() {
    Jail::expect_with(|jail| {
        jail.set_env("SHAPDASH_DASHBOARD__HOST", "0.0.0.0");
        jail.set_env("SHAPDASH_TARGET_VAR", "price");

        let config = ProjectConfig::load(None).map_err(|e| e.to_string())?;
        assert_eq!(config.dashboard.host, "0.0.0.0");
        assert_eq!(config.target_var, "price");
        assert_eq!(config.dashboard.port, 8050);
        Ok(())
    });
}

#[test]
fn test_invalid_env_value_is_a_config_error() {
    Jail::expect_with(|jail| {
        jail.set_env("SHAPDASH_DASHBOARD__HISTOGRAM_BINS", "0");
        assert!(ProjectConfig::load(None).is_err());
        Ok(())
    });
}
