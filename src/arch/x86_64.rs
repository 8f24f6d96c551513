//! x86_64 implementation: callee-saved context on the thread stack.

use super::Arch;

/// x86_64 architecture implementation.
pub struct X86_64Arch;

/// Saved context as laid out on the stack by [`switch_context`], ascending
/// from the saved stack pointer.
#[repr(C)]
#[derive(Debug)]
pub struct X86_64Context {
    pub rflags: u64,
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbx: u64,
    pub rbp: u64,
    pub rip: u64,
}

/// # Safety
/// `prev` must point at the outgoing thread's context slot and `next` must
/// be a context produced by `init_context` or a previous switch.
#[unsafe(naked)]
#[no_mangle]
pub unsafe extern "C" fn switch_context(prev: *mut *mut X86_64Context, next: *mut X86_64Context) {
    core::arch::naked_asm!(
        "
        push rbp
        push rbx
        push r12
        push r13
        push r14
        push r15
        pushfq

        mov [rdi], rsp
        mov rsp, rsi

        popfq
        pop r15
        pop r14
        pop r13
        pop r12
        pop rbx
        pop rbp

        ret
        "
    );
}

// First instruction pointer of every thread: forwards the arguments stashed
// in callee-saved registers by init_context to the kernel entry shim in r14.
#[unsafe(naked)]
#[no_mangle]
unsafe extern "C" fn thread_trampoline() -> ! {
    core::arch::naked_asm!(
        "
        mov rdi, r12
        mov rsi, r13
        call r14
        ud2
        "
    );
}

impl Arch for X86_64Arch {
    type Context = X86_64Context;

    unsafe fn init_context(
        stack: *mut u8,
        size: usize,
        shim: extern "C" fn(usize, usize) -> !,
        a0: usize,
        a1: usize,
    ) -> *mut Self::Context {
        // 16-byte align the top, then place the context block just below it.
        let top = (stack as usize + size) & !0xF;
        let ctx = (top - core::mem::size_of::<X86_64Context>()) as *mut X86_64Context;
        ctx.write(X86_64Context {
            rflags: 0x202,
            r15: 0,
            r14: shim as usize as u64,
            r13: a1 as u64,
            r12: a0 as u64,
            rbx: 0,
            rbp: 0,
            rip: thread_trampoline as usize as u64,
        });
        ctx
    }

    unsafe fn context_switch(prev: *mut *mut Self::Context, next: *mut Self::Context) {
        switch_context(prev, next);
    }

    fn int_enable() {
        unsafe { core::arch::asm!("sti") }
    }

    fn int_disable() {
        unsafe { core::arch::asm!("cli") }
    }

    fn int_enabled() -> bool {
        let rflags: u64;
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) rflags) }
        rflags & 0x200 != 0
    }

    fn cpu_id() -> usize {
        // Single-socket APIC id; the platform layer remaps if needed.
        0
    }

    fn cores() -> usize {
        crate::config::CPUS
    }

    fn send_ipi(_cpu: usize) {
        // Delivered through the platform interrupt controller; the library
        // build has no LAPIC mapping, so remote CPUs pick the change up at
        // their next tick.
    }

    fn wait_for_interrupt() {
        unsafe { core::arch::asm!("hlt") }
    }

    fn halt() {
        loop {
            unsafe { core::arch::asm!("cli; hlt") }
        }
    }

    fn reboot() {
        // Pulse the 8042 reset line.
        unsafe {
            core::arch::asm!("out dx, al", in("dx") 0x64u16, in("al") 0xFEu8);
        }
        Self::halt();
    }
}
