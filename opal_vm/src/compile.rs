//! The lazy block compiler.
//!
//! One-pass lowering of a basic block's instruction objects into the linear
//! opcode encoding. Each instruction becomes a 2-byte opcode tag followed by
//! its immediates. Branch targets (`jump`, `if_true`, `call`) are emitted as
//! pointers to [`BlockVersion`] records: stubs the interpreter patches to
//! direct code addresses the first time they are taken.
//!
//! For `call`, `throw`, and `abort` the compiler also records the
//! instruction-address → enclosing-version mapping that later lets the VM
//! recover the source-position annotation of the originating instruction
//! object. Call sites additionally register a [`RetEntry`] under their
//! return version, carrying the catch-block version when the instruction has
//! a `throw_to` edge.

use std::ptr::NonNull;

use opal_core::{ErrorKind, RunError, RunResult, Tag};

use crate::icache::FieldCache;
use crate::opcode::Op;
use crate::version::{BlockVersion, RetEntry};
use crate::vm::VirtualMachine;

/// The compiler's inline-cache sites, one per lexical named-field access.
///
/// These persist across block compilations: instruction objects share
/// layouts, so each site converges on a stable slot index.
pub(crate) struct CompileCaches {
    instrs: FieldCache,
    op: FieldCache,
    push_val: FieldCache,
    dup_idx: FieldCache,
    get_local_idx: FieldCache,
    set_local_idx: FieldCache,
    has_tag_tag: FieldCache,
    jump_to: FieldCache,
    if_then: FieldCache,
    if_else: FieldCache,
    call_num_args: FieldCache,
    call_ret_to: FieldCache,
    call_throw_to: FieldCache,
}

impl CompileCaches {
    pub(crate) fn new() -> CompileCaches {
        CompileCaches {
            instrs: FieldCache::new("instrs"),
            op: FieldCache::new("op"),
            push_val: FieldCache::new("val"),
            dup_idx: FieldCache::new("idx"),
            get_local_idx: FieldCache::new("idx"),
            set_local_idx: FieldCache::new("idx"),
            has_tag_tag: FieldCache::new("tag"),
            jump_to: FieldCache::new("to"),
            if_then: FieldCache::new("then"),
            if_else: FieldCache::new("else"),
            call_num_args: FieldCache::new("num_args"),
            call_ret_to: FieldCache::new("ret_to"),
            call_throw_to: FieldCache::new("throw_to"),
        }
    }
}

/// Opcodes that carry no immediates, by `op` field name.
fn immediate_free_op(name: &[u8]) -> Option<Op> {
    Some(match name {
        b"pop" => Op::Pop,
        b"swap" => Op::Swap,
        b"add_i32" => Op::AddI32,
        b"sub_i32" => Op::SubI32,
        b"mul_i32" => Op::MulI32,
        b"lt_i32" => Op::LtI32,
        b"le_i32" => Op::LeI32,
        b"gt_i32" => Op::GtI32,
        b"ge_i32" => Op::GeI32,
        b"eq_i32" => Op::EqI32,
        b"add_f32" => Op::AddF32,
        b"sub_f32" => Op::SubF32,
        b"mul_f32" => Op::MulF32,
        b"div_f32" => Op::DivF32,
        b"lt_f32" => Op::LtF32,
        b"le_f32" => Op::LeF32,
        b"gt_f32" => Op::GtF32,
        b"ge_f32" => Op::GeF32,
        b"eq_f32" => Op::EqF32,
        b"sin_f32" => Op::SinF32,
        b"cos_f32" => Op::CosF32,
        b"sqrt_f32" => Op::SqrtF32,
        b"i32_to_f32" => Op::I32ToF32,
        b"f32_to_i32" => Op::F32ToI32,
        b"f32_to_str" => Op::F32ToStr,
        b"str_to_f32" => Op::StrToF32,
        b"eq_bool" => Op::EqBool,
        b"str_len" => Op::StrLen,
        b"get_char" => Op::GetChar,
        b"get_char_code" => Op::GetCharCode,
        b"str_cat" => Op::StrCat,
        b"eq_str" => Op::EqStr,
        b"new_object" => Op::NewObject,
        b"has_field" => Op::HasField,
        b"set_field" => Op::SetField,
        b"get_field" => Op::GetField,
        b"eq_obj" => Op::EqObj,
        b"new_array" => Op::NewArray,
        b"array_len" => Op::ArrayLen,
        b"array_push" => Op::ArrayPush,
        b"set_elem" => Op::SetElem,
        b"get_elem" => Op::GetElem,
        b"ret" => Op::Ret,
        b"import" => Op::Import,
        _ => return None,
    })
}

impl VirtualMachine {
    /// Lower `ver`'s block into the code heap, marking its extent.
    ///
    /// Callers check [`BlockVersion::is_compiled`] first; a compiled version
    /// is never re-entered.
    pub(crate) fn compile(&mut self, ver: NonNull<BlockVersion>) -> RunResult<()> {
        // SAFETY: version records are registry-owned and live for the VM's
        // lifetime; no other reference is active during compilation.
        let (fun, block) = {
            let v = unsafe { ver.as_ref() };
            debug_assert!(!v.is_compiled(), "block version compiled twice");
            (v.fun, v.block)
        };

        let instrs = self.caches.compile.instrs.get_arr(block)?;
        if instrs.is_empty() {
            return Err(RunError::new(ErrorKind::EmptyBlock, "empty basic block"));
        }

        let start_ptr = self.code.alloc_ptr();

        for i in 0..instrs.len() {
            let instr_val = instrs.get(i).expect("index in bounds");
            let instr = instr_val.as_object().ok_or_else(|| {
                RunError::new(
                    ErrorKind::TypeMismatch,
                    format!("instruction {} is {}, expected object", i, instr_val.tag().name()),
                )
            })?;

            let op = self.caches.compile.op.get_str(instr)?;

            // Instruction start address, recorded for the opcodes that need
            // later recovery of their instruction object.
            let instr_addr = self.code.alloc_ptr() as *const u8;

            if let Some(tag) = immediate_free_op(op.as_bytes()) {
                self.code.emit(tag as u16)?;
                continue;
            }

            match op.as_bytes() {
                b"push" => {
                    let val = self.caches.compile.push_val.get(instr)?;
                    self.code.emit(Op::Push as u16)?;
                    self.code.emit(val)?;
                }

                b"dup" => {
                    let idx = self.caches.compile.dup_idx.get_i32(instr)? as u16;
                    self.code.emit(Op::Dup as u16)?;
                    self.code.emit(idx)?;
                }

                b"get_local" => {
                    let idx = self.caches.compile.get_local_idx.get_i32(instr)? as u16;
                    self.code.emit(Op::GetLocal as u16)?;
                    self.code.emit(idx)?;
                }

                b"set_local" => {
                    let idx = self.caches.compile.set_local_idx.get_i32(instr)? as u16;
                    self.code.emit(Op::SetLocal as u16)?;
                    self.code.emit(idx)?;
                }

                b"has_tag" => {
                    let name = self.caches.compile.has_tag_tag.get_str(instr)?;
                    let tag = Tag::from_name(&name.to_utf8_lossy()).ok_or_else(|| {
                        RunError::new(
                            ErrorKind::UnknownOpcode,
                            format!("has_tag with unknown tag \"{}\"", name.to_utf8_lossy()),
                        )
                    })?;
                    self.code.emit(Op::HasTag as u16)?;
                    self.code.emit(tag as u8)?;
                }

                b"jump" => {
                    let dst_block = self.caches.compile.jump_to.get_obj(instr)?;
                    let dst_ver = self.versions.get_or_create(fun, dst_block);
                    self.code.emit(Op::JumpStub as u16)?;
                    self.code.emit(dst_ver.as_ptr())?;
                }

                b"if_true" => {
                    let then_block = self.caches.compile.if_then.get_obj(instr)?;
                    let else_block = self.caches.compile.if_else.get_obj(instr)?;
                    let then_ver = self.versions.get_or_create(fun, then_block);
                    let else_ver = self.versions.get_or_create(fun, else_block);
                    self.code.emit(Op::IfTrue as u16)?;
                    self.code.emit(then_ver.as_ptr())?;
                    self.code.emit(else_ver.as_ptr())?;
                }

                b"call" => {
                    // The call site's instruction object must stay
                    // recoverable for argument-count diagnostics.
                    self.versions.record_instr(instr_addr, ver);

                    let num_args = self.caches.compile.call_num_args.get_i32(instr)? as u16;
                    let ret_block = self.caches.compile.call_ret_to.get_obj(instr)?;
                    let ret_ver = self.versions.get_or_create(fun, ret_block);

                    let mut entry = RetEntry::default();
                    if instr.has_field("throw_to") {
                        let catch_block = self.caches.compile.call_throw_to.get_obj(instr)?;
                        entry.exc_ver = Some(self.versions.get_or_create(fun, catch_block));
                    }
                    self.versions.record_ret(ret_ver, entry);

                    self.code.emit(Op::Call as u16)?;
                    self.code.emit(num_args)?;
                    self.code.emit(ret_ver.as_ptr())?;
                }

                b"throw" => {
                    // Needed to retrieve the identity of the current
                    // function when unwinding.
                    self.versions.record_instr(instr_addr, ver);
                    self.code.emit(Op::Throw as u16)?;
                }

                b"abort" => {
                    // Needed to retrieve the source code position.
                    self.versions.record_instr(instr_addr, ver);
                    self.code.emit(Op::Abort as u16)?;
                }

                other => {
                    return Err(RunError::new(
                        ErrorKind::UnknownOpcode,
                        format!(
                            "unhandled opcode in basic block \"{}\"",
                            String::from_utf8_lossy(other)
                        ),
                    ));
                }
            }
        }

        let end_ptr = self.code.alloc_ptr();
        // SAFETY: as above; this is the one-way uncompiled → compiled
        // transition.
        unsafe {
            (*ver.as_ptr()).start_ptr = start_ptr;
            (*ver.as_ptr()).end_ptr = end_ptr;
        }
        Ok(())
    }
}
