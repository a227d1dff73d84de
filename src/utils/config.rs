use dotenv::dotenv;
use std::env;
use std::path::PathBuf;

pub struct Config {
    /// Crate name, used as the logger target filter.
    pub name: String,
    pub logger_level: String,
    pub logger_dir: Option<PathBuf>,
    pub parallel: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            name: String::from(env!("CARGO_PKG_NAME")),
            logger_level: String::from("warn"),
            logger_dir: None,
            parallel: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        // 优先加载环境变量
        if cfg!(debug_assertions) {
            dotenv::from_filename(".env.development").ok();
        } else {
            dotenv().ok();
        }

        let mut config = Config::default();
        config.apply_env(|key| env::var(key).ok());
        config
    }

    /// Overrides defaults with whatever `lookup` finds for the `WAVESH_*` keys.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("WAVESH_LOG_LEVEL") {
            self.logger_level = level;
        }

        if let Some(dir) = lookup("WAVESH_LOG_DIR").filter(|dir| !dir.trim().is_empty()) {
            self.logger_dir = Some(PathBuf::from(dir));
        }

        if let Some(parallel) = lookup("WAVESH_PARALLEL") {
            self.parallel = matches!(
                parallel.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            );
        }
    }
}
