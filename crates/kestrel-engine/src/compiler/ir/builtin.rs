//! Builtin runtime hooks the compiler lowers to
//!
//! The backend resolves these by name against the runtime's builtin table.
//! The table is versioned; adding or reordering entries bumps the version.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::fmt;

/// Version of the builtin table layout shared with the runtime
pub const BUILTIN_TABLE_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinMethod {
    /// arraySpread(target, iterable, nextIndex) -> nextIndex
    ArraySpread,
    /// apply(callee, argsArray, this) -> result; without `this` it constructs
    Apply,
    /// copyDataProperties(target, source) -> target
    CopyDataProperties,
    /// silentSetPrototypeOf(object, proto)
    SilentSetPrototypeOf,
    /// getMethod(object, name) -> callable or undefined, TypeError otherwise
    GetMethod,
    /// generatorSetDelegated(): marks the running generator as delegating
    GeneratorSetDelegated,
    /// concat(strings...) -> string
    Concat,
    /// getTemplateObject(siteId, sameCooked, raw..., cooked...) -> frozen array;
    /// the cooked strings are omitted when `sameCooked` is true
    GetTemplateObject,
    /// The global `eval` function
    Eval,
    /// getIterator(iterable) -> iterator with a `next` method
    GetIterator,
}

impl BuiltinMethod {
    pub const ALL: [BuiltinMethod; 10] = [
        BuiltinMethod::ArraySpread,
        BuiltinMethod::Apply,
        BuiltinMethod::CopyDataProperties,
        BuiltinMethod::SilentSetPrototypeOf,
        BuiltinMethod::GetMethod,
        BuiltinMethod::GeneratorSetDelegated,
        BuiltinMethod::Concat,
        BuiltinMethod::GetTemplateObject,
        BuiltinMethod::Eval,
        BuiltinMethod::GetIterator,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinMethod::ArraySpread => "arraySpread",
            BuiltinMethod::Apply => "apply",
            BuiltinMethod::CopyDataProperties => "copyDataProperties",
            BuiltinMethod::SilentSetPrototypeOf => "silentSetPrototypeOf",
            BuiltinMethod::GetMethod => "getMethod",
            BuiltinMethod::GeneratorSetDelegated => "generatorSetDelegated",
            BuiltinMethod::Concat => "concat",
            BuiltinMethod::GetTemplateObject => "getTemplateObject",
            BuiltinMethod::Eval => "eval",
            BuiltinMethod::GetIterator => "getIterator",
        }
    }

    /// Stable index into the builtin table
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Look up a builtin by its symbolic name
    pub fn from_name(name: &str) -> Option<BuiltinMethod> {
        BUILTINS_BY_NAME.get(name).copied()
    }
}

static BUILTINS_BY_NAME: Lazy<FxHashMap<&'static str, BuiltinMethod>> = Lazy::new(|| {
    BuiltinMethod::ALL
        .iter()
        .map(|&builtin| (builtin.name(), builtin))
        .collect()
});

impl fmt::Display for BuiltinMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        for builtin in BuiltinMethod::ALL {
            assert_eq!(BuiltinMethod::from_name(builtin.name()), Some(builtin));
        }
        assert_eq!(BuiltinMethod::from_name("nope"), None);
    }

    #[test]
    fn test_indices_are_dense() {
        for (i, builtin) in BuiltinMethod::ALL.iter().enumerate() {
            assert_eq!(builtin.index() as usize, i);
        }
    }
}
