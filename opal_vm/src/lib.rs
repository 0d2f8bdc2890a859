//! Lazy block-compiling interpreter core for the opal virtual machine.
//!
//! The VM consumes a structured program image (a graph of function objects,
//! basic-block objects, and instruction objects) and executes it in two
//! stages:
//!
//! 1. **Lazy block compilation**: the first time a basic block is reached,
//!    its instruction objects are lowered into a linear stream of compact
//!    opcodes emplaced in a contiguous code heap. Branch targets start out
//!    as *stubs* (pointers to [`version::BlockVersion`] records) and are
//!    patched in place to direct code addresses the first time they are
//!    taken.
//! 2. **Threaded dispatch**: a single tight loop reads one opcode tag,
//!    branches to its handler, and continues at whatever address the handler
//!    leaves the instruction pointer at.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      VirtualMachine                        │
//! ├───────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌──────────────┐   ┌─────────────────┐  │
//! │  │ CodeHeap   │   │ ValueStack   │   │ VersionRegistry │  │
//! │  │ (1 MiB)    │   │ (64 Ki cells)│   │ block → version │  │
//! │  └────────────┘   └──────────────┘   └─────────────────┘  │
//! │        ▲                 ▲                    ▲            │
//! │        └── compile ──────┴──── exec loop ─────┘            │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Locals, saved frame context, and operands share one downward-growing
//! value stack; the frame pointer addresses local 0 and further locals live
//! at `fp[-i]`. A null return-version is the "return to host" sentinel.
//!
//! The crate is single-threaded by design: host functions may synchronously
//! re-enter [`VirtualMachine::call_fun`], nesting a frame on the same stack,
//! but no VM state is ever shared across threads.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod code_heap;
pub mod compile;
pub mod icache;
pub mod import;
pub mod opcode;
mod ops;
pub mod stack;
pub mod version;
pub mod vm;

pub use code_heap::CodeHeap;
pub use icache::FieldCache;
pub use import::{HostImports, Importer};
pub use opcode::Op;
pub use stack::ValueStack;
pub use version::{BlockVersion, RetEntry, VersionRegistry};
pub use vm::VirtualMachine;
