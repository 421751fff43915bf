use hashbrown::HashMap;
use std::fmt;

#[derive(Debug, Clone)]
pub(crate) struct EnvVar(pub HashMap<String, String>);
impl std::ops::Deref for EnvVar {
    type Target = HashMap<String, String>;
    fn deref(&self) -> &HashMap<String, String> {
        &self.0
    }
}

impl EnvVar {
    pub(crate) const NAMES: [&'static str; 11] = [
        "ENV",
        "RUST_LOG",
        "FANOUT_WORKERS",
        "FANOUT_QUEUE_CAPACITY",
        "FANOUT_OVERFLOW",
        "FANOUT_DELIVERY_TIMEOUT",
        "FANOUT_RETRY_BASE",
        "FANOUT_RETRY_MAX",
        "FANOUT_MAX_ATTEMPTS",
        "FANOUT_RETRY_JITTER",
        "STREAM_BUFFER",
    ];

    pub(crate) fn new(vars: HashMap<String, String>) -> Self {
        Self(vars)
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut result = String::new();
        for env_var in Self::NAMES.iter() {
            if let Some(value) = self.get(*env_var) {
                result = format!("{}\n    {}: {}", result, env_var, value)
            }
        }
        write!(f, "{}", result)
    }
}

#[macro_export]
macro_rules! from_env_var {
    ($(#[$outer:meta])*
     let name = $name:ident;
     let default: $type:ty = $inner:expr;
     let (env_var, allowed_values) = ($env_var:tt, $allowed_values:expr);
     let from_str = |$arg:ident| $body:expr;
    ) => {
        $(#[$outer])*
        #[derive(Clone, Copy, PartialEq)]
        pub struct $name(pub $type);
        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{:?}", self.0)
            }
        }
        impl std::ops::Deref for $name {
            type Target = $type;
            fn deref(&self) -> &$type {
                &self.0
            }
        }
        impl std::default::Default for $name {
            fn default() -> Self {
                $name($inner)
            }
        }
        impl $name {
            pub const ENV_VAR: &'static str = $env_var;

            fn inner_from_str($arg: &str) -> Option<$type> {
                $body
            }
            pub(crate) fn maybe_update(
                self,
                var: Option<&String>,
            ) -> Result<Self, $crate::err::FatalErr> {
                Ok(match var {
                    Some(empty_string) if empty_string.is_empty() => Self::default(),
                    Some(value) => Self(Self::inner_from_str(value).ok_or_else(|| {
                        $crate::err::FatalErr::config($env_var, value, $allowed_values)
                    })?),
                    None => self,
                })
            }
        }
    };
}
