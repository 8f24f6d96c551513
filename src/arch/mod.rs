//! Architecture abstraction layer.
//!
//! The kernel manipulates CPU state only through this trait: priming a fresh
//! stack with an initial context, switching between saved contexts, fencing
//! interrupts, identifying CPUs and poking remote ones. Context layout is
//! owned by the implementation; the kernel stores opaque pointers.

use crate::config;

/// Architecture contract consumed by the thread kernel.
///
/// # Safety
///
/// Implementations involve inline assembly and direct hardware access. The
/// unsafe methods carry the preconditions the kernel upholds: both context
/// pointers valid, interrupts fenced, and the kernel lock handed off across
/// the switch.
pub trait Arch {
    /// Architecture-specific saved CPU context. Lives inside the owning
    /// thread's stack; the kernel only stores the pointer.
    type Context;

    /// Prime a fresh stack so the first dispatch enters `shim(a0, a1)`.
    ///
    /// Returns the initial context pointer, placed inside the stack.
    ///
    /// # Safety
    ///
    /// `stack` must point to the base of a writable region of at least
    /// `size` bytes that stays valid for the thread's lifetime.
    unsafe fn init_context(
        stack: *mut u8,
        size: usize,
        shim: extern "C" fn(usize, usize) -> !,
        a0: usize,
        a1: usize,
    ) -> *mut Self::Context;

    /// Save the outgoing CPU state into `*prev` and resume from `next`.
    ///
    /// # Safety
    ///
    /// - `prev` must point to the outgoing thread's context slot.
    /// - `next` must be a context previously produced by `init_context` or
    ///   a prior switch.
    /// - Must be called with the kernel lock held; the incoming thread
    ///   releases it in its own resumption scope.
    unsafe fn context_switch(prev: *mut *mut Self::Context, next: *mut Self::Context);

    /// Enable interrupt delivery on the current CPU.
    fn int_enable();

    /// Disable interrupt delivery on the current CPU.
    fn int_disable();

    /// Whether interrupts are currently enabled.
    fn int_enabled() -> bool;

    /// Identity of the executing CPU, in `0..cores()`.
    fn cpu_id() -> usize;

    /// Number of CPUs brought up by the platform.
    fn cores() -> usize;

    /// Force `cpu` to re-enter the scheduler by interrupting it.
    fn send_ipi(cpu: usize);

    /// Park the CPU until the next interrupt.
    fn wait_for_interrupt();

    /// Halt the machine. Called when the last thread exits.
    fn halt();

    /// Reboot the machine. Called when the last thread exits and the
    /// configuration asks for a reboot.
    fn reboot();
}

/// Inert architecture used for host-side testing.
///
/// Context switches are no-ops: the "machine" is the test itself, which
/// drives the kernel through its suspension points and observes the
/// bookkeeping.
pub struct NoOpArch;

impl Arch for NoOpArch {
    type Context = ();

    unsafe fn init_context(
        _stack: *mut u8,
        _size: usize,
        _shim: extern "C" fn(usize, usize) -> !,
        _a0: usize,
        _a1: usize,
    ) -> *mut Self::Context {
        core::ptr::NonNull::dangling().as_ptr()
    }

    unsafe fn context_switch(_prev: *mut *mut Self::Context, _next: *mut Self::Context) {}

    fn int_enable() {}

    fn int_disable() {}

    fn int_enabled() -> bool {
        true
    }

    fn cpu_id() -> usize {
        0
    }

    fn cores() -> usize {
        config::CPUS
    }

    fn send_ipi(_cpu: usize) {}

    fn wait_for_interrupt() {
        core::hint::spin_loop();
    }

    fn halt() {}

    fn reboot() {}
}

#[cfg(all(feature = "x86_64", target_arch = "x86_64"))]
pub mod x86_64;

#[cfg(all(feature = "arm64", target_arch = "aarch64"))]
pub mod aarch64;

#[cfg(all(feature = "riscv64", target_arch = "riscv64"))]
pub mod riscv64;

#[cfg(all(target_arch = "x86_64", feature = "x86_64"))]
pub use x86_64::X86_64Arch as DefaultArch;

#[cfg(all(target_arch = "aarch64", feature = "arm64"))]
pub use aarch64::Aarch64Arch as DefaultArch;

#[cfg(all(target_arch = "riscv64", feature = "riscv64"))]
pub use riscv64::Riscv64Arch as DefaultArch;

// Host builds and unconfigured targets fall back to the inert architecture.
#[cfg(not(any(
    all(target_arch = "x86_64", feature = "x86_64"),
    all(target_arch = "aarch64", feature = "arm64"),
    all(target_arch = "riscv64", feature = "riscv64"),
)))]
pub use NoOpArch as DefaultArch;
