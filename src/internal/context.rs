/// Execution state saved on a process stack when it enters the kernel.
///
/// The layout matches the order the system-call stub pushes registers, so it
/// must stay `repr(C)` and must not be reordered.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Context {
    pub ds: u32,
    pub es: u32,
    pub fs: u32,
    pub gs: u32,
    pub ss: u32,
    /// system-call number on entry, result on return
    pub eax: i32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

/// size in bytes of a saved context on a process stack
pub const CONTEXT_SIZE: usize = core::mem::size_of::<Context>();

impl Context {
    /// a zeroed context carrying only a system-call number
    pub fn with_request(code: i32) -> Self {
        Context {
            eax: code,
            ..Context::default()
        }
    }

    /// the system-call number (or result) in the accumulator
    pub fn request(&self) -> i32 {
        self.eax
    }

    /// write a result back into the accumulator
    pub fn set_result(&mut self, value: i32) {
        self.eax = value;
    }
}
