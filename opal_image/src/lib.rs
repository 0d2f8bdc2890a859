//! Program image parser for the opal virtual machine.
//!
//! An image is the textual serialization of a program graph: named object,
//! array, and scalar nodes with `@name` references between them, rooted at
//! a `@root` package object whose fields are the exports. The execution
//! core only ever sees the resulting [`opal_core::Object`] graph; this
//! crate owns the surface syntax.
//!
//! ```text
//! @root  = { main: @main }
//! @main  = { entry: @entry, num_params: 0, num_locals: 0 }
//! @entry = { instrs: [ { op: "push", val: 777 }, { op: "ret" } ] }
//! ```

pub mod error;
mod parse;

use std::path::Path;

pub use error::ImageError;
pub use parse::parse_image;

use opal_core::Object;

/// Read and parse an image file, returning its root package object.
pub fn parse_file(path: &Path) -> Result<Object, ImageError> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| ImageError::file(format!("cannot read \"{}\": {}", path.display(), e)))?;
    parse_image(&source)
}
