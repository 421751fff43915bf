use std::fmt;

/// Failures that keep the engine from starting at all.
pub enum FatalErr {
    Config(String),
    Dotenv(dotenv::Error),
}

impl FatalErr {
    pub fn config(var: impl fmt::Display, value: impl fmt::Display, allowed_vals: impl fmt::Display) -> Self {
        Self::Config(format!(
            "{0} is set to `{1}`, which is invalid.\n{3:7}{0} must be {2}.",
            var, value, allowed_vals, ""
        ))
    }
}

impl std::error::Error for FatalErr {}
impl fmt::Debug for FatalErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl fmt::Display for FatalErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use FatalErr::*;
        match self {
            Config(e) => write!(f, "{}", e),
            Dotenv(e) => write!(f, "could not load the .env file.\n{:7}{}", "", e),
        }
    }
}

impl From<dotenv::Error> for FatalErr {
    fn from(e: dotenv::Error) -> Self {
        Self::Dotenv(e)
    }
}
