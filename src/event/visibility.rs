use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase", deny_unknown_fields)]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Public
    }
}
