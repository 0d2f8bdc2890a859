//! Host package imports.
//!
//! The `import` instruction pops a package name and asks the host for the
//! package object. The host side of that contract is the [`Importer`]
//! trait; [`HostImports`] is the default implementation, a name-keyed
//! registry pre-seeded with the `core` package of built-in host functions.

use opal_core::hostfn::{HostCall, HostCtx, HostFn};
use opal_core::{ErrorKind, Object, RunError, RunResult, Str, Value};
use rustc_hash::FxHashMap;

/// Resolver for `import(package_name) → package object`.
pub trait Importer {
    fn import(&mut self, pkg: &str) -> RunResult<Object>;
}

/// Default importer: a registry of host-provided package objects.
pub struct HostImports {
    packages: FxHashMap<String, Object>,
}

impl HostImports {
    /// Create a registry seeded with the `core` package.
    pub fn new() -> HostImports {
        let mut imports = HostImports {
            packages: FxHashMap::default(),
        };
        imports.register("core", core_package());
        imports
    }

    /// Create an empty registry.
    pub fn empty() -> HostImports {
        HostImports {
            packages: FxHashMap::default(),
        }
    }

    /// Register (or replace) a package under `name`.
    pub fn register(&mut self, name: &str, pkg: Object) {
        self.packages.insert(name.to_owned(), pkg);
    }
}

impl Default for HostImports {
    fn default() -> HostImports {
        HostImports::new()
    }
}

impl Importer for HostImports {
    fn import(&mut self, pkg: &str) -> RunResult<Object> {
        self.packages.get(pkg).copied().ok_or_else(|| {
            RunError::new(ErrorKind::UnknownPackage, format!("unknown package \"{}\"", pkg))
        })
    }
}

// =============================================================================
// The core package
// =============================================================================

fn host_print(_ctx: &mut dyn HostCtx, val: Value) -> Value {
    print!("{}", val);
    Value::UNDEF
}

fn host_println(_ctx: &mut dyn HostCtx, val: Value) -> Value {
    println!("{}", val);
    Value::UNDEF
}

fn host_read_line(_ctx: &mut dyn HostCtx) -> Value {
    let mut line = String::new();
    // EOF or a read failure yields the empty string.
    let _ = std::io::stdin().read_line(&mut line);
    Value::from(Str::new(line.trim_end_matches('\n')))
}

/// Build the `core` package object.
pub fn core_package() -> Object {
    let pkg = Object::with_capacity(3);
    pkg.set_field(
        "print",
        Value::from(HostFn::leak("print", HostCall::Arity1(host_print))),
    );
    pkg.set_field(
        "println",
        Value::from(HostFn::leak("println", HostCall::Arity1(host_println))),
    );
    pkg.set_field(
        "read_line",
        Value::from(HostFn::leak("read_line", HostCall::Arity0(host_read_line))),
    );
    pkg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_package_present() {
        let mut imports = HostImports::new();
        let core = imports.import("core").unwrap();
        assert!(core.get_field("print").unwrap().is_hostfn());
        assert!(core.get_field("read_line").unwrap().is_hostfn());
    }

    #[test]
    fn test_unknown_package() {
        let mut imports = HostImports::new();
        let err = imports.import("no_such_pkg").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownPackage);
    }

    #[test]
    fn test_register_custom_package() {
        let mut imports = HostImports::empty();
        let pkg = Object::with_capacity(1);
        pkg.set_field("answer", Value::int32(42));
        imports.register("answers", pkg);
        let got = imports.import("answers").unwrap();
        assert_eq!(got.get_field("answer"), Some(Value::int32(42)));
    }
}
