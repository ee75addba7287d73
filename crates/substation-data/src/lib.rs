pub mod loader;

pub use loader::{
    ConfigError, load_solver_config, load_solver_config_from_dir, load_solver_config_from_env,
    load_solver_config_or_default,
};
