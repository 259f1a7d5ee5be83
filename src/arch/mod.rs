//! Architecture-dependent code.
//!
//! The kernel proper runs only on x86-64 bare metal. The `hosted` stand-in
//! provides just enough (no-op interrupt plumbing) for the pure-logic
//! modules to compile and run their unit tests on the host.

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", target_os = "none"))] {
        pub mod x86_64;
        pub use x86_64::{intr_get, intr_off, intr_on, wait_for_interrupt};
    } else {
        mod hosted;
        pub use hosted::{intr_get, intr_off, intr_on, wait_for_interrupt};
    }
}
