//! Aggregate functions available to window queries.
//!
//! Functions are looked up in a [`FunctionRegistry`] that the caller builds
//! and passes to the compiler.  There is no process-wide registry.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::error::{EvalError, PlanError};
use crate::value::Value;

/// An aggregate function such as `COUNT` or `SUM`.
pub trait AggregateFunction: Send + Sync {
    /// Name under which the function is registered.  Lookups are
    /// case-insensitive.
    fn name(&self) -> &str;

    /// Returns `true` if the function can be called with `arity` arguments.
    fn accepts_arity(&self, arity: usize) -> bool;

    /// Name of the function that combines partial results of this function
    /// into the final result, e.g. `SUM` for `COUNT`.
    ///
    /// Only queries whose functions all have a merge function can be split
    /// into a local and a global stage.
    fn merge_function(&self) -> Option<&str>;

    fn create_accumulator(&self) -> Box<dyn Accumulator>;
}

/// Running state of one aggregate over one group.
pub trait Accumulator {
    /// Adds one input row, given as the values of the call's arguments.
    fn accumulate(&mut self, args: &[Value]) -> Result<(), EvalError>;

    fn value(&self) -> Value;
}

/// Name-to-implementation map of aggregate functions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Arc<dyn AggregateFunction>>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry containing `COUNT`, `SUM`, `MIN` and `MAX`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [Arc<dyn AggregateFunction>; 4] =
            [Arc::new(Count), Arc::new(Sum), Arc::new(Min), Arc::new(Max)];
        for function in builtins {
            registry
                .functions
                .insert(function.name().to_ascii_uppercase(), function);
        }
        registry
    }

    /// Adds `function`, failing if a function of the same name exists.
    pub fn register(&mut self, function: Arc<dyn AggregateFunction>) -> Result<(), PlanError> {
        let key = function.name().to_ascii_uppercase();
        if self.functions.contains_key(&key) {
            return Err(PlanError::DuplicateFunction {
                name: function.name().to_string(),
            });
        }
        self.functions.insert(key, function);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AggregateFunction>> {
        self.functions.get(&name.to_ascii_uppercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.values().map(|f| f.name())
    }
}

impl Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// `COUNT(*)` counts rows, `COUNT(x)` counts non-null values of `x`.
struct Count;

impl AggregateFunction for Count {
    fn name(&self) -> &str {
        "COUNT"
    }

    fn accepts_arity(&self, arity: usize) -> bool {
        arity <= 1
    }

    fn merge_function(&self) -> Option<&str> {
        Some("SUM")
    }

    fn create_accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(CountAccumulator(0))
    }
}

struct CountAccumulator(i64);

impl Accumulator for CountAccumulator {
    fn accumulate(&mut self, args: &[Value]) -> Result<(), EvalError> {
        if args.iter().all(|arg| !arg.is_null()) {
            self.0 += 1;
        }
        Ok(())
    }

    fn value(&self) -> Value {
        Value::Int(self.0)
    }
}

/// Sum of the non-null integer values of its argument; `NULL` if there are
/// none.
struct Sum;

impl AggregateFunction for Sum {
    fn name(&self) -> &str {
        "SUM"
    }

    fn accepts_arity(&self, arity: usize) -> bool {
        arity == 1
    }

    fn merge_function(&self) -> Option<&str> {
        Some("SUM")
    }

    fn create_accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(SumAccumulator(None))
    }
}

struct SumAccumulator(Option<i64>);

impl Accumulator for SumAccumulator {
    fn accumulate(&mut self, args: &[Value]) -> Result<(), EvalError> {
        match args {
            [Value::Null] => Ok(()),
            [Value::Int(i)] => {
                let sum = self
                    .0
                    .unwrap_or(0)
                    .checked_add(*i)
                    .ok_or_else(|| EvalError::Overflow {
                        function: "SUM".to_string(),
                    })?;
                self.0 = Some(sum);
                Ok(())
            }
            _ => Err(type_mismatch("SUM", args)),
        }
    }

    fn value(&self) -> Value {
        self.0.map(Value::Int).unwrap_or(Value::Null)
    }
}

struct Min;

impl AggregateFunction for Min {
    fn name(&self) -> &str {
        "MIN"
    }

    fn accepts_arity(&self, arity: usize) -> bool {
        arity == 1
    }

    fn merge_function(&self) -> Option<&str> {
        Some("MIN")
    }

    fn create_accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(ExtremumAccumulator {
            function: "MIN",
            keep_greater: false,
            current: None,
        })
    }
}

struct Max;

impl AggregateFunction for Max {
    fn name(&self) -> &str {
        "MAX"
    }

    fn accepts_arity(&self, arity: usize) -> bool {
        arity == 1
    }

    fn merge_function(&self) -> Option<&str> {
        Some("MAX")
    }

    fn create_accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(ExtremumAccumulator {
            function: "MAX",
            keep_greater: true,
            current: None,
        })
    }
}

struct ExtremumAccumulator {
    function: &'static str,
    keep_greater: bool,
    current: Option<Value>,
}

impl Accumulator for ExtremumAccumulator {
    fn accumulate(&mut self, args: &[Value]) -> Result<(), EvalError> {
        let [value] = args else {
            return Err(type_mismatch(self.function, args));
        };
        if value.is_null() {
            return Ok(());
        }
        let replace = match &self.current {
            None => true,
            Some(current) if self.keep_greater => value > current,
            Some(current) => value < current,
        };
        if replace {
            self.current = Some(value.clone());
        }
        Ok(())
    }

    fn value(&self) -> Value {
        self.current.clone().unwrap_or(Value::Null)
    }
}

fn type_mismatch(function: &str, args: &[Value]) -> EvalError {
    let values: Vec<String> = args.iter().map(|v| v.to_string()).collect();
    EvalError::TypeMismatch {
        function: function.to_string(),
        value: format!("({})", values.join(", ")),
    }
}
