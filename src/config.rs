//! Configuration for the fan-out engine.  Every setting has a default that can be
//! overridden by an environmental variable (set at runtime or in the `.env` file).
pub use fanout_cfg::Fanout;
pub use fanout_cfg_types::*;

use self::environmental_variables::EnvVar;
use super::err;
use hashbrown::HashMap;
use std::env;

mod environmental_variables;
mod fanout_cfg;
mod fanout_cfg_types;

pub fn merge_dotenv() -> Result<(), err::FatalErr> {
    let file = match env::var("ENV").ok().as_deref() {
        Some("production") => ".env.production",
        Some("development") | None => ".env",
        Some(unsupported) => Err(err::FatalErr::config(
            "ENV",
            unsupported,
            "`production` or `development`",
        ))?,
    };
    match dotenv::from_filename(file) {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => {
            log::info!("No {} file found; using the process environment only", file);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn from_env(env_vars: HashMap<String, String>) -> Result<Fanout, err::FatalErr> {
    let env_vars = EnvVar::new(env_vars);
    log::info!("Environmental variables the fan-out engine received: {}", &env_vars);
    Fanout::from_env(env_vars)
}
