//! IR0: a small x86-64 monolithic kernel in Rust.
//!
//! The crate builds as a staticlib for bare metal. Pure-logic modules
//! (path handling, allocators, scheduler queues, the filesystems) also
//! compile for the host so their unit tests run under `cargo test`;
//! everything that touches the CPU or MMIO is gated on
//! `target_os = "none"`.

#![cfg_attr(not(test), no_std)]
//
// # Tries to deny most lints (`rustc -W help`).
#![deny(absolute_paths_not_starting_with_crate)]
#![deny(anonymous_parameters)]
#![deny(deprecated_in_future)]
#![deny(elided_lifetimes_in_paths)]
#![deny(explicit_outlives_requirements)]
#![deny(keyword_idents)]
#![deny(macro_use_extern_crate)]
#![deny(non_ascii_idents)]
#![deny(rust_2018_idioms)]
#![deny(trivial_numeric_casts)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(unused_extern_crates)]
#![deny(unused_import_braces)]
#![allow(dead_code)]

extern crate alloc;

mod addr;
mod arch;
mod bio;
mod dev;
mod error;
mod file;
mod fs;
mod heap;
mod intr;
mod kalloc;
mod lock;
mod page;
mod param;
mod pipe;
mod sched;
mod stat;

#[cfg(target_os = "none")]
mod console;
#[cfg(target_os = "none")]
mod exec;
#[cfg(target_os = "none")]
mod kernel;
#[cfg(target_os = "none")]
mod klog;
#[cfg(target_os = "none")]
mod proc;
#[cfg(target_os = "none")]
mod syscall;
#[cfg(target_os = "none")]
mod trap;
#[cfg(target_os = "none")]
mod vm;
