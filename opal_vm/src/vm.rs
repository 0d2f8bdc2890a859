//! The virtual machine: threaded dispatch loop and call gateway.
//!
//! A single tight loop reads one 2-byte opcode tag, branches to its handler,
//! and continues. Each handler advances the instruction pointer past exactly
//! the immediates it consumes. Branches to not-yet-compiled blocks are
//! *stubs* (their immediate words hold `BlockVersion` pointers) and are
//! patched to direct code addresses in place the first time they are taken:
//!
//! - `JumpStub`: compile the target if needed, rewrite the immediate to the
//!   target's start address, rewrite the opcode itself to `Jump`, jump.
//! - `IfTrue`: each side is patched independently the first time *that*
//!   side is taken; a target word outside the code heap's address range is
//!   still a version reference.
//!
//! Calls push three saved-context words (previous stack pointer, previous
//! frame pointer, return version) at the bottom of the callee frame;
//! arguments are reused in place as the first locals. A null return version
//! marks the top-level frame: `Ret` through it exits the loop and hands the
//! return value to [`VirtualMachine::call_fun`].

use std::mem::size_of;
use std::ptr::{self, NonNull};

use opal_core::hostfn::HostCtx;
use opal_core::{pos_to_string, ErrorKind, HostFn, Object, RunError, RunResult, Str, Value};
use smallvec::SmallVec;

use crate::code_heap::{CodeHeap, CODE_HEAP_DEFAULT_SIZE};
use crate::compile::CompileCaches;
use crate::icache::FieldCache;
use crate::import::{HostImports, Importer};
use crate::opcode::Op;
use crate::ops;
use crate::stack::{ValueStack, STACK_DEFAULT_SIZE};
use crate::version::{BlockVersion, VersionRegistry};

// =============================================================================
// Inline-cache sites
// =============================================================================

/// All of the VM's named-field access sites, one cache per lexical lookup.
pub(crate) struct VmCaches {
    pub(crate) compile: CompileCaches,
    /// `call` opcode: callee function layout.
    call_entry: FieldCache,
    call_num_locals: FieldCache,
    call_num_params: FieldCache,
    /// `call_fun` gateway: callee function layout.
    gateway_num_params: FieldCache,
    gateway_num_locals: FieldCache,
    gateway_entry: FieldCache,
    /// Source-position recovery.
    src_instrs: FieldCache,
    /// Throw unwinding: frame layout of the function being unwound.
    unwind_num_locals: FieldCache,
}

impl VmCaches {
    fn new() -> VmCaches {
        VmCaches {
            compile: CompileCaches::new(),
            call_entry: FieldCache::new("entry"),
            call_num_locals: FieldCache::new("num_locals"),
            call_num_params: FieldCache::new("num_params"),
            gateway_num_params: FieldCache::new("num_params"),
            gateway_num_locals: FieldCache::new("num_locals"),
            gateway_entry: FieldCache::new("entry"),
            src_instrs: FieldCache::new("instrs"),
            unwind_num_locals: FieldCache::new("num_locals"),
        }
    }
}

// =============================================================================
// Virtual machine
// =============================================================================

/// A single-threaded execution core.
///
/// Owns the code heap, the value stack, and every registry keyed by them.
/// Host functions may re-enter [`VirtualMachine::call_fun`] synchronously;
/// the nested session shares this state and runs to completion before the
/// outer loop resumes.
pub struct VirtualMachine {
    pub(crate) code: CodeHeap,
    pub(crate) versions: VersionRegistry,
    pub(crate) caches: VmCaches,
    importer: Box<dyn Importer>,
    /// Memo of all one-character string values, keyed by byte. `UNDEF`
    /// marks an empty slot, so every byte value is cacheable.
    char_strings: [Value; 256],
    /// Backing storage for the value stack; pointers below index into it.
    #[allow(dead_code)]
    stack: ValueStack,
    /// Lowest valid stack cell; `sp` must stay above it.
    stack_limit: *mut Value,
    /// One past the highest cell; `sp` when the stack is empty.
    stack_base: *mut Value,
    /// Current frame's local 0; locals live at `fp[-i]`. Null at top level.
    fp: *mut Value,
    /// Top of stack; decreases on push.
    sp: *mut Value,
    /// Next opcode tag to execute.
    ip: *mut u8,
}

impl VirtualMachine {
    /// Create a VM with default capacities (1 MiB code heap, 64 Ki stack
    /// slots) and the default host imports.
    pub fn new() -> VirtualMachine {
        VirtualMachine::with_capacity(CODE_HEAP_DEFAULT_SIZE, STACK_DEFAULT_SIZE)
    }

    /// Create a VM with explicit code-heap and stack capacities.
    pub fn with_capacity(code_bytes: usize, stack_slots: usize) -> VirtualMachine {
        let mut stack = ValueStack::new(stack_slots);
        let stack_limit = stack.limit_ptr();
        let stack_base = stack.base_ptr();
        VirtualMachine {
            code: CodeHeap::new(code_bytes),
            versions: VersionRegistry::new(),
            caches: VmCaches::new(),
            importer: Box::new(HostImports::new()),
            char_strings: [Value::UNDEF; 256],
            stack,
            stack_limit,
            stack_base,
            fp: ptr::null_mut(),
            sp: stack_base,
            ip: ptr::null_mut(),
        }
    }

    /// Replace the host importer.
    pub fn set_importer(&mut self, importer: Box<dyn Importer>) {
        self.importer = importer;
    }

    /// The code heap, for introspection.
    pub fn code_heap(&self) -> &CodeHeap {
        &self.code
    }

    /// Number of block versions created so far.
    pub fn version_count(&self) -> usize {
        self.versions.version_count()
    }

    /// The version compiled for `block`, if one exists.
    pub fn block_version(&self, block: Object) -> Option<&BlockVersion> {
        // SAFETY: registry-owned versions live as long as self; the shared
        // borrow of self keeps compilation (which needs &mut) away.
        self.versions.lookup(block).map(|v| unsafe { &*v.as_ptr() })
    }

    /// Number of slots currently allocated on the value stack.
    #[inline(always)]
    pub fn stack_size(&self) -> usize {
        // SAFETY: sp always lies within [stack_limit, stack_base].
        unsafe { self.stack_base.offset_from(self.sp) as usize }
    }

    // =========================================================================
    // Stack access
    // =========================================================================

    #[inline(always)]
    pub(crate) fn push_val(&mut self, val: Value) -> RunResult<()> {
        if self.sp <= self.stack_limit {
            return Err(RunError::new(
                ErrorKind::StackOverflow,
                "value stack exhausted",
            ));
        }
        // SAFETY: sp > limit, so the cell below sp is valid.
        unsafe {
            self.sp = self.sp.sub(1);
            self.sp.write(val);
        }
        Ok(())
    }

    #[inline(always)]
    pub(crate) fn push_bool(&mut self, val: bool) -> RunResult<()> {
        self.push_val(if val { Value::TRUE } else { Value::FALSE })
    }

    #[inline(always)]
    pub(crate) fn pop_val(&mut self) -> Value {
        debug_assert!(self.sp < self.stack_base, "value stack underflow");
        // SAFETY: the bytecode's stack discipline guarantees an operand is
        // present; sp stays within the stack storage.
        unsafe {
            let val = self.sp.read();
            self.sp = self.sp.add(1);
            val
        }
    }

    fn type_err(expected: &str, got: Value) -> RunError {
        RunError::new(
            ErrorKind::TypeMismatch,
            format!("operand is {}, expected {}", got.tag().name(), expected),
        )
    }

    #[inline(always)]
    pub(crate) fn pop_i32(&mut self) -> RunResult<i32> {
        let val = self.pop_val();
        val.as_int32().ok_or_else(|| Self::type_err("int32", val))
    }

    #[inline(always)]
    pub(crate) fn pop_f32(&mut self) -> RunResult<f32> {
        let val = self.pop_val();
        val.as_float32()
            .ok_or_else(|| Self::type_err("float32", val))
    }

    #[inline(always)]
    pub(crate) fn pop_bool(&mut self) -> RunResult<bool> {
        let val = self.pop_val();
        val.as_bool().ok_or_else(|| Self::type_err("bool", val))
    }

    #[inline(always)]
    pub(crate) fn pop_str(&mut self) -> RunResult<Str> {
        let val = self.pop_val();
        val.as_str().ok_or_else(|| Self::type_err("string", val))
    }

    #[inline(always)]
    pub(crate) fn pop_obj(&mut self) -> RunResult<Object> {
        let val = self.pop_val();
        val.as_object()
            .ok_or_else(|| Self::type_err("object", val))
    }

    #[inline(always)]
    pub(crate) fn pop_arr(&mut self) -> RunResult<opal_core::Array> {
        let val = self.pop_val();
        val.as_array().ok_or_else(|| Self::type_err("array", val))
    }

    /// Read an immediate of type `T` at the instruction pointer and advance
    /// past it.
    #[inline(always)]
    fn read_imm<T: Copy>(&mut self) -> T {
        // SAFETY: the compiler emitted sizeof(T) immediate bytes here; the
        // dispatch loop only reads immediates its own opcode carries.
        unsafe {
            let val = (self.ip as *const T).read_unaligned();
            self.ip = self.ip.add(size_of::<T>());
            val
        }
    }

    // =========================================================================
    // Versions and positions
    // =========================================================================

    /// Compile `ver` if it has not been compiled yet and return its start
    /// address.
    pub(crate) fn compile_if_needed(&mut self, ver: NonNull<BlockVersion>) -> RunResult<*mut u8> {
        // SAFETY: version records are registry-owned and live for the VM's
        // lifetime.
        if !unsafe { ver.as_ref() }.is_compiled() {
            self.compile(ver)?;
        }
        Ok(unsafe { ver.as_ref() }.start_ptr)
    }

    /// The single-character string for `byte`, interned across the run.
    pub(crate) fn char_string(&mut self, byte: u8) -> Value {
        let slot = &mut self.char_strings[byte as usize];
        if slot.is_undef() {
            *slot = Value::from(Str::from_bytes(&[byte]));
        }
        *slot
    }

    /// Best-effort source position for an instruction address.
    ///
    /// Only instructions the compiler recorded (call, throw, abort) can be
    /// recovered; the block's instruction objects are scanned in reverse for
    /// the nearest `src_pos` annotation.
    fn get_src_pos(&mut self, instr_addr: *const u8) -> Option<String> {
        let ver = self.versions.lookup_instr(instr_addr)?;
        // SAFETY: registry-owned version.
        let block = unsafe { ver.as_ref() }.block;
        let instrs = self.caches.src_instrs.get_arr(block).ok()?;
        for i in (0..instrs.len()).rev() {
            let instr = instrs.get(i)?.as_object()?;
            if let Some(pos) = instr.get_field("src_pos") {
                return pos_to_string(pos);
            }
        }
        None
    }

    // =========================================================================
    // Dispatch loop
    // =========================================================================

    /// Execute from the current instruction pointer until a top-level
    /// return.
    fn exec(&mut self) -> RunResult<Value> {
        debug_assert!(self.code.contains_addr(self.ip as usize));

        loop {
            #[cfg(debug_assertions)]
            self.check_stack_invariant();

            // Address of the opcode being executed, kept for in-place
            // patching and instruction-map lookups.
            let op_addr = self.ip;
            let raw = self.read_imm::<u16>();
            let Some(op) = Op::from_u16(raw) else {
                unreachable!("corrupt opcode tag {:#06x} in code stream", raw);
            };

            match op {
                // -------------------------------------------------------------
                // Stack manipulation
                // -------------------------------------------------------------
                Op::Push => {
                    let val = self.read_imm::<Value>();
                    self.push_val(val)?;
                }

                Op::Pop => {
                    self.pop_val();
                }

                Op::Dup => {
                    let idx = self.read_imm::<u16>() as usize;
                    debug_assert!(idx < self.stack_size());
                    // SAFETY: sp[idx] lies within the allocated stack region.
                    let val = unsafe { self.sp.add(idx).read() };
                    self.push_val(val)?;
                }

                Op::Swap => {
                    let v0 = self.pop_val();
                    let v1 = self.pop_val();
                    self.push_val(v0)?;
                    self.push_val(v1)?;
                }

                Op::SetLocal => {
                    let idx = self.read_imm::<u16>() as usize;
                    let val = self.pop_val();
                    // SAFETY: fp[-idx] is a local slot of the current frame.
                    unsafe { self.fp.sub(idx).write(val) };
                }

                Op::GetLocal => {
                    let idx = self.read_imm::<u16>() as usize;
                    // SAFETY: fp[-idx] is a local slot of the current frame.
                    let val = unsafe { self.fp.sub(idx).read() };
                    self.push_val(val)?;
                }

                // -------------------------------------------------------------
                // Arithmetic, conversions, booleans
                // -------------------------------------------------------------
                Op::AddI32 => ops::arith::add_i32(self)?,
                Op::SubI32 => ops::arith::sub_i32(self)?,
                Op::MulI32 => ops::arith::mul_i32(self)?,
                Op::LtI32 => ops::arith::lt_i32(self)?,
                Op::LeI32 => ops::arith::le_i32(self)?,
                Op::GtI32 => ops::arith::gt_i32(self)?,
                Op::GeI32 => ops::arith::ge_i32(self)?,
                Op::EqI32 => ops::arith::eq_i32(self)?,

                Op::AddF32 => ops::arith::add_f32(self)?,
                Op::SubF32 => ops::arith::sub_f32(self)?,
                Op::MulF32 => ops::arith::mul_f32(self)?,
                Op::DivF32 => ops::arith::div_f32(self)?,
                Op::LtF32 => ops::arith::lt_f32(self)?,
                Op::LeF32 => ops::arith::le_f32(self)?,
                Op::GtF32 => ops::arith::gt_f32(self)?,
                Op::GeF32 => ops::arith::ge_f32(self)?,
                Op::EqF32 => ops::arith::eq_f32(self)?,
                Op::SinF32 => ops::arith::sin_f32(self)?,
                Op::CosF32 => ops::arith::cos_f32(self)?,
                Op::SqrtF32 => ops::arith::sqrt_f32(self)?,

                Op::I32ToF32 => ops::arith::i32_to_f32(self)?,
                Op::F32ToI32 => ops::arith::f32_to_i32(self)?,
                Op::F32ToStr => ops::arith::f32_to_str(self)?,
                Op::StrToF32 => ops::arith::str_to_f32(self)?,

                Op::EqBool => ops::arith::eq_bool(self)?,

                Op::HasTag => {
                    let tag = self.read_imm::<u8>();
                    let val = self.pop_val();
                    self.push_bool(val.tag() as u8 == tag)?;
                }

                // -------------------------------------------------------------
                // Strings
                // -------------------------------------------------------------
                Op::StrLen => ops::strings::str_len(self)?,
                Op::GetChar => ops::strings::get_char(self)?,
                Op::GetCharCode => ops::strings::get_char_code(self)?,
                Op::StrCat => ops::strings::str_cat(self)?,
                Op::EqStr => ops::strings::eq_str(self)?,

                // -------------------------------------------------------------
                // Objects and arrays
                // -------------------------------------------------------------
                Op::NewObject => ops::containers::new_object(self)?,
                Op::HasField => ops::containers::has_field(self)?,
                Op::SetField => ops::containers::set_field(self)?,
                Op::GetField => ops::containers::get_field(self)?,
                Op::EqObj => ops::containers::eq_obj(self)?,

                Op::NewArray => ops::containers::new_array(self)?,
                Op::ArrayLen => ops::containers::array_len(self)?,
                Op::ArrayPush => ops::containers::array_push(self)?,
                Op::SetElem => ops::containers::set_elem(self)?,
                Op::GetElem => ops::containers::get_elem(self)?,

                // -------------------------------------------------------------
                // Branches
                // -------------------------------------------------------------
                Op::JumpStub => {
                    let imm_addr = self.ip;
                    let ver_ptr = self.read_imm::<*mut BlockVersion>();
                    let Some(ver) = NonNull::new(ver_ptr) else {
                        unreachable!("jump stub with null version");
                    };
                    let start = self.compile_if_needed(ver)?;
                    // Patch the opcode and the immediate in place; this
                    // site dispatches as a direct jump from now on.
                    // SAFETY: both addresses lie in the code heap, inside
                    // the extent this opcode was compiled into.
                    unsafe {
                        (op_addr as *mut u16).write_unaligned(Op::Jump as u16);
                        (imm_addr as *mut *mut u8).write_unaligned(start);
                    }
                    self.ip = start;
                }

                Op::Jump => {
                    let dst = self.read_imm::<*mut u8>();
                    self.ip = dst;
                }

                Op::IfTrue => {
                    let then_addr = self.ip;
                    // SAFETY: two pointer-sized immediates follow the tag.
                    let else_addr = unsafe { self.ip.add(size_of::<*mut u8>()) };
                    self.ip = unsafe { self.ip.add(2 * size_of::<*mut u8>()) };

                    let cond = self.pop_val();
                    let site = if cond == Value::TRUE { then_addr } else { else_addr };

                    // SAFETY: site points at a pointer-sized immediate word.
                    let word = unsafe { (site as *const *mut u8).read_unaligned() };
                    let target = if self.code.contains_addr(word as usize) {
                        word
                    } else {
                        // Outside the code heap: still a version reference.
                        // Compile and patch this side; the other side stays
                        // untouched until it is taken.
                        let Some(ver) = NonNull::new(word as *mut BlockVersion) else {
                            unreachable!("if_true stub with null version");
                        };
                        let start = self.compile_if_needed(ver)?;
                        // SAFETY: as above.
                        unsafe { (site as *mut *mut u8).write_unaligned(start) };
                        start
                    };
                    self.ip = target;
                }

                // -------------------------------------------------------------
                // Calls and returns
                // -------------------------------------------------------------
                Op::Call => {
                    let num_args = self.read_imm::<u16>() as usize;
                    let ret_ver_ptr = self.read_imm::<*mut BlockVersion>();
                    let Some(ret_ver) = NonNull::new(ret_ver_ptr) else {
                        unreachable!("call with null return version");
                    };

                    let callee = self.pop_val();

                    if self.stack_size() < num_args {
                        return Err(RunError::new(
                            ErrorKind::StackUnderflow,
                            "stack underflow at call",
                        ));
                    }

                    if let Some(fun) = callee.as_object() {
                        self.fun_call(op_addr, fun, num_args, ret_ver)?;
                    } else if let Some(host) = callee.as_hostfn() {
                        self.host_call(op_addr, host, num_args, ret_ver)?;
                    } else {
                        return Err(RunError::new(
                            ErrorKind::InvalidCallee,
                            format!("invalid callee at call site ({})", callee.tag().name()),
                        )
                        .with_pos(self.get_src_pos(op_addr)));
                    }
                }

                Op::Ret => {
                    if let Some(ret_val) = self.op_ret()? {
                        return Ok(ret_val);
                    }
                }

                Op::Throw => {
                    let exc = self.pop_val();
                    self.throw_unwind(op_addr, exc)?;
                }

                // -------------------------------------------------------------
                // Host interface
                // -------------------------------------------------------------
                Op::Import => {
                    let name = self.pop_str()?;
                    let pkg = self.importer.import(&name.to_utf8_lossy())?;
                    self.push_val(Value::from(pkg))?;
                }

                Op::Abort => self.op_abort(op_addr),
            }
        }
    }

    #[cfg(debug_assertions)]
    fn check_stack_invariant(&self) {
        debug_assert!(self.stack_limit < self.sp && self.sp <= self.stack_base);
        if !self.fp.is_null() {
            // sp at most one slot above the frame's local 0.
            debug_assert!(self.sp as usize <= self.fp as usize + size_of::<Value>());
        }
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Enter a user function: build its frame and jump to its entry block.
    ///
    /// Stack layout after the prologue (addresses decrease downward):
    ///
    /// ```text
    ///   fp        → arg 0 / local 0
    ///   fp[-1]    → arg 1 / local 1
    ///   ...
    ///   fp[-(num_locals-1)]
    ///   fp[-num_locals]     → saved sp
    ///   fp[-num_locals - 1] → saved fp
    ///   fp[-num_locals - 2] → return version   ← sp
    /// ```
    fn fun_call(
        &mut self,
        call_instr: *const u8,
        fun: Object,
        num_args: usize,
        ret_ver: NonNull<BlockVersion>,
    ) -> RunResult<()> {
        let entry_block = self.caches.call_entry.get_obj(fun)?;
        let entry_ver = self.versions.get_or_create(fun, entry_block);
        let entry_start = self.compile_if_needed(entry_ver)?;

        let num_locals = self.caches.call_num_locals.get_i32(fun)?.max(0) as usize;
        let num_params = self.caches.call_num_params.get_i32(fun)?.max(0) as usize;

        if num_args != num_params {
            return Err(RunError::new(
                ErrorKind::ArgCount,
                format!(
                    "incorrect argument count in call, received {}, expected {}",
                    num_args, num_params
                ),
            )
            .with_pos(self.get_src_pos(call_instr)));
        }
        if num_locals < num_params {
            return Err(RunError::new(
                ErrorKind::ArgCount,
                "not enough locals to store function parameters",
            ));
        }

        // Room for the extra locals plus the three saved-context words.
        // SAFETY: sp and limit belong to the same stack allocation.
        let avail = unsafe { self.sp.offset_from(self.stack_limit) } as usize;
        if avail < num_locals - num_args + 3 {
            return Err(RunError::new(
                ErrorKind::StackOverflow,
                "value stack exhausted at call",
            ));
        }

        // The stack pointer to restore on return: the arguments are
        // consumed by the call.
        // SAFETY: all adjusted pointers stay inside the stack region, per
        // the capacity check above (fp may sit one below sp for zero-arg
        // calls; its lowest-addressed local is still in range).
        let prev_sp = unsafe { self.sp.add(num_args) };
        let prev_fp = self.fp;
        self.fp = unsafe { self.sp.offset(num_args as isize - 1) };

        // Pop the arguments, push the callee's remaining locals.
        self.sp = unsafe { self.sp.sub(num_locals - num_args) };

        self.push_val(Value::raw_ptr(prev_sp))?;
        self.push_val(Value::raw_ptr(prev_fp))?;
        self.push_val(Value::raw_ptr(ret_ver.as_ptr()))?;

        self.ip = entry_start;
        Ok(())
    }

    /// Dispatch a host-function call and continue at the return version.
    fn host_call(
        &mut self,
        call_instr: *const u8,
        host: &'static HostFn,
        num_args: usize,
        ret_ver: NonNull<BlockVersion>,
    ) -> RunResult<()> {
        if host.arity() != num_args {
            return Err(RunError::new(
                ErrorKind::ArgCount,
                format!(
                    "host function {} takes {} arguments, received {}",
                    host.name(),
                    host.arity(),
                    num_args
                ),
            )
            .with_pos(self.get_src_pos(call_instr)));
        }

        // Arguments in source order: the first argument is the deepest.
        let mut args: SmallVec<[Value; 4]> = SmallVec::new();
        for k in 0..num_args {
            // SAFETY: the caller verified num_args operands are present.
            args.push(unsafe { self.sp.add(num_args - 1 - k).read() });
        }

        // The host function may re-enter call_fun on this same VM; the
        // arguments stay live on the stack below the nested frames.
        let ret_val = host.invoke(self, &args);

        // Pop the arguments, push the return value.
        // SAFETY: num_args operands were present above sp.
        self.sp = unsafe { self.sp.add(num_args) };
        self.push_val(ret_val)?;

        let start = self.compile_if_needed(ret_ver)?;
        self.ip = start;
        Ok(())
    }

    /// Handle `Ret`: restore the caller frame. Returns the final value when
    /// the popped return version is the top-level null sentinel.
    fn op_ret(&mut self) -> RunResult<Option<Value>> {
        let ret_val = self.pop_val();

        let ret_ver_word = self.pop_val();
        let ret_ver = ret_ver_word
            .as_raw_ptr::<BlockVersion>()
            .ok_or_else(|| Self::type_err("saved return version", ret_ver_word))?;
        let prev_fp_word = self.pop_val();
        let prev_fp = prev_fp_word
            .as_raw_ptr::<Value>()
            .ok_or_else(|| Self::type_err("saved frame pointer", prev_fp_word))?;
        let prev_sp_word = self.pop_val();
        let prev_sp = prev_sp_word
            .as_raw_ptr::<Value>()
            .ok_or_else(|| Self::type_err("saved stack pointer", prev_sp_word))?;

        self.fp = prev_fp;
        self.sp = prev_sp;

        match NonNull::new(ret_ver) {
            // Top-level return: exit the loop.
            None => Ok(Some(ret_val)),
            Some(ver) => {
                self.push_val(ret_val)?;
                let start = self.compile_if_needed(ver)?;
                self.ip = start;
                Ok(None)
            }
        }
    }

    /// Handle `Throw`: unwind frames until a call site with a catch version
    /// is found, restore its caller context, and continue there with the
    /// exception value pushed.
    fn throw_unwind(&mut self, throw_instr: *const u8, exc: Value) -> RunResult<()> {
        let uncaught = |vm: &mut VirtualMachine| {
            Err(RunError::new(
                ErrorKind::UncaughtException,
                format!("uncaught exception: {}", exc),
            )
            .with_pos(vm.get_src_pos(throw_instr)))
        };

        // The throwing frame's identity comes from the instruction map; the
        // frames below are identified by each return version's function.
        let Some(mut ver) = self.versions.lookup_instr(throw_instr) else {
            return uncaught(self);
        };

        loop {
            // SAFETY: registry-owned version.
            let fun = unsafe { ver.as_ref() }.fun;
            let num_locals = self.caches.unwind_num_locals.get_i32(fun)?.max(0) as usize;

            // Saved-context words at the bottom of this frame.
            // SAFETY: the frame layout places these three slots below the
            // locals; all addresses stay inside the stack region.
            let ret_ver_word = unsafe { self.fp.sub(num_locals + 2).read() };
            let prev_fp_word = unsafe { self.fp.sub(num_locals + 1).read() };
            let prev_sp_word = unsafe { self.fp.sub(num_locals).read() };

            let ret_ver = ret_ver_word
                .as_raw_ptr::<BlockVersion>()
                .ok_or_else(|| Self::type_err("saved return version", ret_ver_word))?;
            let prev_fp = prev_fp_word
                .as_raw_ptr::<Value>()
                .ok_or_else(|| Self::type_err("saved frame pointer", prev_fp_word))?;
            let prev_sp = prev_sp_word
                .as_raw_ptr::<Value>()
                .ok_or_else(|| Self::type_err("saved stack pointer", prev_sp_word))?;

            // Discard this frame.
            self.fp = prev_fp;
            self.sp = prev_sp;

            let Some(ret_ver) = NonNull::new(ret_ver) else {
                // Unwound past the top-level sentinel without a handler.
                return uncaught(self);
            };

            let entry = self.versions.lookup_ret(ret_ver.as_ptr());
            if let Some(exc_ver) = entry.and_then(|e| e.exc_ver) {
                // Land in the catch block with the exception value pushed.
                self.push_val(exc)?;
                let start = self.compile_if_needed(exc_ver)?;
                self.ip = start;
                return Ok(());
            }

            // No handler at this call site: keep unwinding through the
            // caller, whose layout the return version identifies.
            ver = ret_ver;
        }
    }

    /// Handle `Abort`: print the best-effort source position and message,
    /// then terminate the process.
    fn op_abort(&mut self, instr_addr: *const u8) -> ! {
        let msg = self.pop_val();
        let msg_text = msg
            .as_str()
            .map(|s| s.to_utf8_lossy().into_owned())
            .unwrap_or_default();

        if let Some(pos) = self.get_src_pos(instr_addr) {
            eprint!("{} - ", pos);
        }
        if msg_text.is_empty() {
            eprintln!("aborting execution due to error");
        } else {
            eprintln!("aborting execution due to error: {}", msg_text);
        }
        std::process::exit(255);
    }

    // =========================================================================
    // Call gateway
    // =========================================================================

    /// Call a program function to completion.
    ///
    /// Seeds a top-level frame (null return version), runs the dispatch
    /// loop, restores the previous instruction pointer, and verifies the
    /// stack returned to its pre-call size. Re-entrant: host functions may
    /// call this on the executing VM.
    pub fn call_fun(&mut self, fun: Object, args: &[Value]) -> RunResult<Value> {
        let num_params = self.caches.gateway_num_params.get_i32(fun)?.max(0) as usize;
        let num_locals = self.caches.gateway_num_locals.get_i32(fun)?.max(0) as usize;

        if args.len() > num_params {
            return Err(RunError::new(
                ErrorKind::ArgCount,
                format!(
                    "called with {} arguments, function takes {}",
                    args.len(),
                    num_params
                ),
            ));
        }
        if num_params > num_locals {
            return Err(RunError::new(
                ErrorKind::ArgCount,
                "not enough locals to store function parameters",
            ));
        }

        let pre_call_size = self.stack_size();

        // Save the previous instruction pointer across the nested session.
        self.push_val(Value::raw_ptr(self.ip))?;

        // SAFETY: sp and limit belong to the same allocation.
        let avail = unsafe { self.sp.offset_from(self.stack_limit) } as usize;
        if avail < num_locals + 3 {
            return Err(RunError::new(
                ErrorKind::StackOverflow,
                "value stack exhausted at call",
            ));
        }

        let prev_sp = self.sp;
        let prev_fp = self.fp;

        // Local 0 sits just below the saved instruction pointer.
        // SAFETY: the capacity check above keeps every adjusted pointer
        // inside the stack region.
        self.fp = unsafe { self.sp.sub(1) };
        self.sp = unsafe { self.sp.sub(num_locals) };

        self.push_val(Value::raw_ptr(prev_sp))?;
        self.push_val(Value::raw_ptr(prev_fp))?;
        self.push_val(Value::raw_ptr(ptr::null_mut::<BlockVersion>()))?;

        // Store the arguments into the lowest-indexed locals.
        for (i, arg) in args.iter().enumerate() {
            // SAFETY: i < num_params <= num_locals.
            unsafe { self.fp.sub(i).write(*arg) };
        }

        let entry_block = self.caches.gateway_entry.get_obj(fun)?;
        let entry_ver = self.versions.get_or_create(fun, entry_block);
        let entry_start = self.compile_if_needed(entry_ver)?;
        debug_assert!(!unsafe { entry_ver.as_ref() }.is_empty());

        self.ip = entry_start;
        let ret_val = self.exec()?;

        // Restore the previous instruction pointer.
        let saved_ip = self.pop_val();
        self.ip = saved_ip
            .as_raw_ptr::<u8>()
            .ok_or_else(|| Self::type_err("saved instruction pointer", saved_ip))?;

        if self.stack_size() != pre_call_size {
            return Err(RunError::new(
                ErrorKind::StackImbalance,
                "stack size does not match after call termination",
            ));
        }

        Ok(ret_val)
    }

    /// Call a function exported by a package object.
    pub fn call_export_fn(&mut self, pkg: Object, name: &str, args: &[Value]) -> RunResult<Value> {
        let Some(fn_val) = pkg.get_field(name) else {
            return Err(RunError::new(
                ErrorKind::MissingExport,
                format!("package does not export function \"{}\"", name),
            ));
        };
        let Some(fun) = fn_val.as_object() else {
            return Err(RunError::new(
                ErrorKind::ExportNotFunction,
                format!("field \"{}\" exported by package is not a function", name),
            ));
        };
        self.call_fun(fun, args)
    }
}

impl Default for VirtualMachine {
    fn default() -> VirtualMachine {
        VirtualMachine::new()
    }
}

impl HostCtx for VirtualMachine {
    fn call_fun(&mut self, fun: Object, args: &[Value]) -> RunResult<Value> {
        VirtualMachine::call_fun(self, fun, args)
    }
}
