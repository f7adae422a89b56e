use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One aggregate function call of a window query, e.g.
/// `COUNT(DISTINCT c) AS distinct_cnt`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AggregateCall {
    /// Function name, resolved case-insensitively against the function
    /// registry.
    pub function: String,

    /// Argument columns, in call order.  Empty for `COUNT(*)`.
    pub args: Vec<String>,

    #[serde(default)]
    pub distinct: bool,

    /// Name of the output column.
    pub name: String,
}

impl AggregateCall {
    pub fn new(function: &str, args: &[&str], name: &str) -> Self {
        Self {
            function: function.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            distinct: false,
            name: name.to_string(),
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

impl Display for AggregateCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = if self.args.is_empty() {
            "*".to_string()
        } else {
            self.args.join(", ")
        };
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        write!(f, "{}({distinct}{args}) AS {}", self.function, self.name)
    }
}
